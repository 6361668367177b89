use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use anyhow::{Context, Result};

use antagonist::harness::local::{default_work_dir, is_root};
use antagonist::harness::remote::{serve, Hello};
use antagonist::harness::thermal::ThermalSensor;
use antagonist::harness::{LocalHarness, LocalSettings};
use antagonist::template::TemplateRegistry;

pub fn run_serve(
    bind: &str,
    templates: &Path,
    compiler: String,
    work_dir: Option<PathBuf>,
    shutdown: &'static AtomicBool,
) -> Result<()> {
    let registry = TemplateRegistry::load(templates)?;
    let work_dir = work_dir.unwrap_or_else(|| default_work_dir().join("serve"));
    let listener = TcpListener::bind(bind).with_context(|| format!("binding {}", bind))?;

    println!("ANTAGONIST REMOTE EVALUATOR");
    println!("LISTENING:       {}", bind);
    println!("TEMPLATES:       {} ({})", registry.len(), templates.display());
    println!("WORK DIR:        {}", work_dir.display());
    if !is_root() {
        println!("NOT ROOT:        NICE -20, GOVERNOR AND drop_caches ARE BEST EFFORT");
    }
    println!();

    let make = |hello: &Hello| {
        let settings = LocalSettings {
            sut: PathBuf::from(&hello.sut),
            compiler: compiler.clone(),
            work_dir: work_dir.clone(),
            max_temperature: hello.max_temperature,
            cooldown: Duration::from_secs(hello.cooldown_secs),
            drop_caches: hello.drop_caches,
            governor: hello.governor.clone(),
            sensor: ThermalSensor::default(),
        };
        LocalHarness::new(settings, registry.clone(), shutdown)
    };
    let sessions = serve(listener, make, shutdown)?;

    println!("SERVED {} SESSIONS", sessions);
    println!("ANTAGONIST OUT.");
    Ok(())
}
