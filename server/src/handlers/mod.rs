pub mod service_handler;
