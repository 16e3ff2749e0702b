pub mod client;
mod test;

pub use client::ContainerOperationsClient;
