pub mod tracing_factory;

