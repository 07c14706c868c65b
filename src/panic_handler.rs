use std::panic;
use std::thread;

use log::error;

/// Install `better_panic` and make sure every panic also reaches the log file.
///
/// The process is not terminated here: panics raised inside a render job are
/// caught by the worker, which reports the job as failed and keeps running.
pub fn initialize_panic_handler() {
    better_panic::install();

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let thread = thread::current();
        error!(
            "Panic on thread {}: {panic_info}",
            thread.name().unwrap_or("<unnamed>")
        );
        log::logger().flush();

        default_hook(panic_info);
    }));
}
