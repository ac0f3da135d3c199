pub mod flag_matching;
pub mod flag_matching_utils;
pub mod flag_models;
