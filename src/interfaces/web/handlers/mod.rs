pub mod agents;
pub mod auditlog;
pub mod commands;
pub mod dispatch;
pub mod jobs;
pub mod schedules;
pub mod watch;
