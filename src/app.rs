/// The application name
pub const NAME: &str = "logship";

/// The application version
pub const VERSION: &str = env!("BUILD_VERSION");

