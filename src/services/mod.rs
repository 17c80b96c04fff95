pub mod catalog;
pub mod fetcher;
pub mod ingest;
pub mod m3u_parser;
pub mod m3u_writer;
pub mod metrics;
