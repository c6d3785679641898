pub mod memory;
pub mod pool;
pub mod temp_schema;
