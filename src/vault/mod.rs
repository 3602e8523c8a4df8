pub mod attachments;
pub mod audit;
pub mod config;
pub mod fetcher;
pub mod paths;
pub mod pipeline;
pub mod record;
pub mod resume;
pub mod reverse;
pub mod writer;
