mod common;

mod distributed;
mod matrices;
mod moves;
mod parser_cache;
mod scenarios;
mod serialization;
mod sheet_content;
mod sheets;
