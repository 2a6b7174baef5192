use std::io;

use once_cell::sync::OnceCell;
use tracing::Level;
use tracing_appender::rolling;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Guards global initialization; the teacher repo used a bare
/// `static mut is_init: bool`, which is unsound under concurrent
/// access (and a CAS process can install the subscriber from more than
/// one handshake path). `OnceCell` gives the same "init exactly once,
/// subsequent calls are no-ops" behaviour without the `unsafe`.
static INIT: OnceCell<()> = OnceCell::new();

#[derive(Debug, Clone)]
pub enum OutputType {
    Stdout,
    File,
}

#[derive(Debug, Clone)]
pub struct TracingFactoryOptions {
    debug: bool,
    output_type: OutputType,
    level: Level,
    log_dir: Option<String>,
}

impl Default for TracingFactoryOptions {
    fn default() -> Self {
        TracingFactoryOptions::new_with_debug(false)
    }
}

impl TracingFactoryOptions {
    pub fn new_with_debug(debug: bool) -> Self {
        TracingFactoryOptions::new_with_type(debug, OutputType::Stdout)
    }

    pub fn new_with_type(debug: bool, output_type: OutputType) -> Self {
        TracingFactoryOptions::new(debug, output_type, None)
    }

    pub fn new(debug: bool, output_type: OutputType, log_dir: Option<String>) -> Self {
        let level = if debug { Level::DEBUG } else { Level::INFO };
        TracingFactoryOptions { debug, output_type, level, log_dir }
    }

    pub fn get_log_dir(&self) -> &str {
        self.log_dir.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Default)]
pub struct TracingFactory {
    options: TracingFactoryOptions,
}

impl TracingFactory {
    pub fn init_log(debug: bool) -> Self {
        TracingFactory::init_log_with_options(TracingFactoryOptions::new_with_debug(debug))
    }

    pub fn init_log_with_options(opt: TracingFactoryOptions) -> Self {
        let mut opts = opt.clone();
        let dir = opts.log_dir.clone().unwrap_or_else(|| {
            let path = String::from("/tmp/cas/logs");
            opts.log_dir = Some(path.clone());
            path
        });

        INIT.get_or_init(|| {
            let format = tracing_subscriber::fmt::format()
                .with_file(true)
                .with_line_number(false)
                .with_target(false)
                .with_thread_ids(true)
                .with_thread_names(true)
                .compact();

            match opts.output_type {
                OutputType::Stdout => {
                    let _ = tracing_subscriber::fmt()
                        .with_max_level(opts.level)
                        .event_format(format)
                        .try_init();
                }
                OutputType::File => {
                    let file_appender = rolling::daily(format!("{dir}/cas"), "file.log");
                    let writer = file_appender.and(io::stdout);
                    let _ = tracing_subscriber::fmt()
                        .with_max_level(opts.level)
                        .event_format(format)
                        .with_writer(writer)
                        .try_init();
                }
            }
        });

        TracingFactory { options: opts }
    }

    pub fn get_log_dir(&self) -> &str {
        self.options.get_log_dir()
    }
}
