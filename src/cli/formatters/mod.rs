pub mod search_results;

pub use search_results::SearchReport;
