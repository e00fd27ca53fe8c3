mod summary;

pub use summary::{new_session_id, now_utc_iso, write_session_summary, SessionSummary};
