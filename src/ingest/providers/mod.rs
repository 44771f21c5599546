pub mod wildberries;
pub mod yandex_market;

pub use wildberries::WildberriesSource;
pub use yandex_market::YandexMarketSource;
