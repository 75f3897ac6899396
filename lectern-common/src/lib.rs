pub mod model;
pub mod sanitize;
pub mod snowflake;
pub mod util;
