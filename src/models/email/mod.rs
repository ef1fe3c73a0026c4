//! Email records at their three lifecycle stages: insert input, stored
//! row, and listing projection.

pub mod db_email;
pub mod email_summary;
pub mod new_email;
