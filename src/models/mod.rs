mod daily_log;
mod goal;

pub use daily_log::{Attachment, DailyLog, FuturePlan};
pub use goal::Goal;
