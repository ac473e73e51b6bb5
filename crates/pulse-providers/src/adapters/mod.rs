pub mod alpha_vantage;
pub mod gdelt;
pub mod google_news;
pub mod met_norway;
pub mod open_meteo;
mod weather;

pub use alpha_vantage::AlphaVantageAdapter;
pub use gdelt::GdeltAdapter;
pub use google_news::GoogleNewsAdapter;
pub use met_norway::MetNorwayAdapter;
pub use open_meteo::OpenMeteoAdapter;
