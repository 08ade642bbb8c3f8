pub mod net;
pub mod params;
pub mod password;
pub mod sign;
pub mod snowflake;
pub mod time;
pub mod validate;
