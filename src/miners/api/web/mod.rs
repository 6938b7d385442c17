pub mod antminer;
pub mod braiins;
pub mod esp;
pub mod traits;

pub use antminer::AntminerWebApi;
pub use braiins::BraiinsWebApi;
pub use esp::EspWebApi;
pub use traits::WebApiClient;
