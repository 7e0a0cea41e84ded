pub mod html;
pub mod json_api;
pub mod rss;

pub use html::{CardSelectors, HtmlFetcher};
pub use json_api::{JsonApiFetcher, Projection};
pub use rss::RssFetcher;
