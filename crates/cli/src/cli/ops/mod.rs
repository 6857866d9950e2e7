pub mod init;
pub mod replay;
pub mod version;

pub use init::Init;
pub use replay::Replay;
pub use version::Version;
