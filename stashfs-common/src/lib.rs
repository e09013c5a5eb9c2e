pub mod backend;
pub mod breadcrumbs;
pub mod documents;
pub mod error;
pub mod paths;
