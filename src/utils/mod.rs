pub mod wait_spec;

pub use self::wait_spec::{WaitSpec, WaitUnit};
