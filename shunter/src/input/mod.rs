pub mod scenario;
pub mod scenario_parser;
