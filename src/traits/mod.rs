//! Traits shared by engines and the pool.
//!
//! [`Healthcheck`] is a supertrait of [`RenderEngine`](crate::RenderEngine):
//! the pool pings every idle engine before lending it out.

mod healthcheck;

pub use healthcheck::Healthcheck;
