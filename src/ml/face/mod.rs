#[cfg(feature = "cascade")]
pub mod cascade;
pub mod crop;
pub mod detect;
pub mod detector;
pub mod overlay;
pub mod portrait;
