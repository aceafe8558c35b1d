pub mod observer;

pub use observer::RequestObserver;
