pub mod blog;
pub mod cache;
pub mod config;
pub mod escape;
pub mod path_index;
pub mod posts;
pub mod site;
pub mod template;
pub mod truncate;
pub mod view;

pub use cache::{CacheMode, RenderCache};
pub use config::SiteConfig;
pub use escape::escape_html;
pub use site::Site;
pub use template::{Partials, TemplateEngine, render};
pub use truncate::{Truncated, truncate};
pub use view::{Value, View};
