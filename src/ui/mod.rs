pub mod progress;
pub mod output;
pub mod signals;

pub use progress::{ConsoleReporter, ProgressManager};
pub use output::{format_duration, OutputFormatter, OutputMode};
pub use signals::GracefulShutdown;
