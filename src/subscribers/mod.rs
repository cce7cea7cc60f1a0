//! Event subscriber layer: the [`Subscribe`] extension point, the
//! [`SubscriberSet`] fan-out, and the optional stdout [`LogWriter`].

mod set;
mod subscribe;

#[cfg(feature = "logging")]
mod log;

pub use set::SubscriberSet;
pub use subscribe::Subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
