pub mod general;
pub mod news;
pub mod weather;

pub use news::{HeadlinesSource, NewsApiSource};
pub use weather::{ForecastSource, WeatherApiSource};
