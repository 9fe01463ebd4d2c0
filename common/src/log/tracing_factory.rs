use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::Level;
use tracing_appender::rolling;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Whether the global subscriber has been installed.
static IS_INIT: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Clone, Default)]
pub struct TracingFactory {
    options: TracingFactoryOptions,
}

#[derive(Debug, Clone)]
pub struct TracingFactoryOptions {
    debug: bool,

    output_type: OutputType,

    level: Option<Level>,

    log_dir: Option<String>,
}

#[derive(Debug, Clone)]
pub enum OutputType {
    STDOUT,

    LOG,
}

impl TracingFactory {
    pub fn init_log(debug: bool) -> Self {
        TracingFactory::init_log_with_options(TracingFactoryOptions::new_with_debug(debug))
    }

    pub fn init_log_with_options(opt: TracingFactoryOptions) -> Self {
        let mut opts = opt.clone();

        let dir = match opt.log_dir {
            None => {
                let path = String::from("/tmp/muxd/logs");
                opts.log_dir = Some(path.clone());

                path
            }
            Some(dir) => dir.clone(),
        };

        let level = match opts.level {
            None => Level::INFO,
            Some(l) => l,
        };

        if !IS_INIT.swap(true, Ordering::SeqCst) {
            let format = fmt::format()
                .pretty()
                .with_file(true)
                .with_line_number(false)
                .with_target(false)
                .with_thread_ids(true)
                .with_thread_names(true)
                .compact();

            match opts.output_type {
                OutputType::STDOUT => {
                    let _ = tracing_subscriber::fmt()
                        .with_max_level(level)
                        .event_format(format)
                        .pretty()
                        // sets this to be the default, global collector for this application.
                        .try_init();
                }
                OutputType::LOG => {
                    // file output plus stdout
                    let file_appender = rolling::daily(format!("{}/muxd", dir.as_str()), "file.log");

                    let merge = file_appender.and(io::stdout);

                    let _ = tracing_subscriber::fmt()
                        .with_max_level(level)
                        .event_format(format)
                        .pretty()
                        .with_writer(merge)
                        // sets this to be the default, global collector for this application.
                        .try_init();
                }
            };
        }

        TracingFactory {
            options: opts.clone(),
        }
    }

    pub fn get_log_dir(&self) -> &str {
        self.options.get_log_dir()
    }
}

impl Default for TracingFactoryOptions {
    fn default() -> Self {
        TracingFactoryOptions::new_with_debug(true)
    }
}

impl TracingFactoryOptions {
    pub fn new_with_debug(debug: bool) -> Self {
        TracingFactoryOptions::new_with_type(debug, OutputType::STDOUT)
    }

    pub fn new_with_type(debug: bool, output_type: OutputType) -> Self {
        TracingFactoryOptions::new(debug, output_type, None)
    }

    pub fn new(debug: bool, output_type: OutputType, log_dir: Option<String>) -> Self {
        let level = if debug { Level::DEBUG } else { Level::INFO };

        TracingFactoryOptions {
            debug,
            output_type,
            level: Some(level),
            log_dir,
        }
    }

    pub fn get_log_dir(&self) -> &str {
        match self.log_dir.as_ref() {
            None => "",
            Some(dir) => dir.as_str(),
        }
    }
}

#[cfg(test)]
mod test {
    use tracing::{debug, error, info, warn};

    use super::TracingFactory;

    #[test]
    fn test() {
        TracingFactory::init_log(true);
        TracingFactory::init_log(true);

        debug!("TracingFactory test: {:?}", "test");
        info!("TracingFactory test: {:?}", "test");
        warn!("TracingFactory test: {:?}", "test");
        error!("TracingFactory test: {:?}", "test");
    }
}
