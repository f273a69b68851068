pub mod cache;
pub mod error;
pub mod executor;
pub mod manifest;
pub mod presenter;
pub mod registry;
pub mod value;

pub use cache::{FragmentCache, MemoryFragmentCache, PlanCache};
pub use error::RenderError;
pub use executor::{Renderer, render, render_to_string};
pub use manifest::{Manifest, ManifestError, StaticPresenter};
pub use presenter::{Bindings, Presenter};
pub use registry::{PresenterFactory, PresenterRegistry};
pub use value::Value;
