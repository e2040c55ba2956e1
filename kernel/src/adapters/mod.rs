// Remote service adapters.

pub mod http;
