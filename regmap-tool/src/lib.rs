//! Command-line editor for Modbus RTU register maps.
//!
//! The `regmap` binary edits a persisted configuration one command at a time
//! and generates the C files firmware includes:
//!
//! ```text
//! regmap new plant.json --role master
//! regmap add-slave plant.json 3
//! regmap quick-add plant.json 0 hr 10 --slave 3
//! regmap export plant.json --out-dir firmware/
//! ```

pub mod cli;
pub mod commands;
