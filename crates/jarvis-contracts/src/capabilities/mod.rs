mod registry;

pub use registry::{
    CapabilityDescriptor, CapabilityRegistry, GENERAL_CAPABILITY, VISION_CAPABILITY,
};
