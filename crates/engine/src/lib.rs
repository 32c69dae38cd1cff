pub mod poller;
pub mod settings;
pub mod upbit;

pub use poller::BatchPoller;
pub use settings::PollerSettings;
pub use upbit::UpbitClient;
