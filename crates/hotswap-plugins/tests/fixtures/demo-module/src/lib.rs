//! Native module used to exercise `NativeLinker`
//!
//! Exports `Ctrl` (top-level, activates instantly) and its dependent `Helper`.
//! Lifecycle calls are appended to [`log_path`], one line each, tagged with
//! the number of `awake` calls this library copy has seen.

use std::any::Any;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use hotswap_kernel::{
    ActivationMeta, ComponentResult, ComponentScope, ReloadableComponent, Startup,
};
use hotswap_plugins::hot_reload::{ModuleRegistrar, factory_for};

// per library copy
static AWAKE_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Lifecycle log shared with the host process
pub fn log_path() -> PathBuf {
    std::env::temp_dir().join(format!("hotswap-demo-module-{}.log", std::process::id()))
}

fn record(line: String) {
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(log_path()) {
        let _ = writeln!(file, "{}", line);
    }
}

#[derive(Default)]
struct Ctrl {
    name: String,
    helper: Option<Box<dyn ReloadableComponent>>,
}

impl ReloadableComponent for Ctrl {
    fn awake(&mut self, scope: &dyn ComponentScope) -> ComponentResult<()> {
        self.name = scope.identity().name().to_string();
        self.helper = Some(scope.construct("Helper")?);

        let count = AWAKE_COUNT.fetch_add(1, Ordering::SeqCst) + 1;
        record(format!(
            "awake {} with {} #{}",
            self.name,
            scope.resolve("Helper").name(),
            count
        ));
        Ok(())
    }

    fn on_destroy(&mut self) {
        record(format!("destroy {}", self.name));
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Default)]
struct Helper;

impl ReloadableComponent for Helper {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn register(registrar: &mut ModuleRegistrar) {
    registrar
        .top_level("Ctrl", ActivationMeta::new(Startup::Instantly), factory_for::<Ctrl>())
        .dependent("Helper", factory_for::<Helper>());
}

hotswap_plugins::declare_module!(register);
