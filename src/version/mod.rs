pub mod diff;
pub mod semver;

pub use diff::{ChangeKind, find_change, find_func_change};
pub use semver::TypeVersion;
