//! Common imports.
//!
//! ```rust
//! use markup2pdf::prelude::*;
//!
//! let page = PageConfiguration::default();
//! let doc = Document::new("out.pdf", "<p>hi</p>");
//! assert_eq!(StrategySelector::default().choose_strategy(&doc, &page), Strategy::Direct);
//! ```

pub use crate::config::{PrinterConfig, PrinterConfigBuilder};
pub use crate::document::{ContentSize, Document, Margins, Orientation, PageConfiguration, PaperSize};
pub use crate::error::{PrintError, Result};
pub use crate::factory::{ChromeEngineFactory, EngineFactory};
pub use crate::handle::EngineLease;
pub use crate::pool::EnginePool;
pub use crate::printer::{PrintReport, Printer};
pub use crate::stats::PoolStats;
pub use crate::strategy::{Strategy, StrategySelector};
pub use crate::{SharedPrinter, traits::Healthcheck};

#[cfg(feature = "env-config")]
pub use crate::printer::init_printer;
