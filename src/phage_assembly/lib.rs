extern crate anyhow;
extern crate csv;
extern crate regex;

pub mod assembly_submit;
pub mod logging;
