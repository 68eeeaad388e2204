pub mod http_trace;
