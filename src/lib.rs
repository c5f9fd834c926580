pub mod config;
pub mod driver;
pub mod enrich;
pub mod http;
pub mod logging;
pub mod mosaic;
pub mod ranks;
pub mod schema;
pub mod table;

pub mod util {
    pub mod env;
}
