//! Step harness: runs a JSON script of bus events against the cartridge
//! core and prints one JSON record per step.
//!
//! ```json
//! {
//!   "image": "gamekiller.bin",
//!   "format": "bin",
//!   "steps": [
//!     { "op": "store", "addr": 56832 },
//!     { "op": "freeze" },
//!     { "op": "read", "addr": 57344 }
//!   ]
//! }
//! ```
//!
//! Without `image` a generated test pattern is attached.

use anyhow::{Context, Result, bail};
use gamekiller_core::prelude::*;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io::Cursor;
use std::path::PathBuf;

#[derive(Debug, Default, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ImageFormat {
    #[default]
    Bin,
    Crt,
}

#[derive(Debug, Deserialize)]
struct Script {
    #[serde(default)]
    image: Option<PathBuf>,
    #[serde(default)]
    format: ImageFormat,
    steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Step {
    Store {
        addr: u16,
        #[serde(default)]
        value: u8,
    },
    Read {
        addr: u16,
    },
    Freeze,
    Reset,
    Save,
    Restore,
    Detach,
}

impl Step {
    fn name(&self) -> &'static str {
        match self {
            Step::Store { .. } => "store",
            Step::Read { .. } => "read",
            Step::Freeze => "freeze",
            Step::Reset => "reset",
            Step::Save => "save",
            Step::Restore => "restore",
            Step::Detach => "detach",
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
struct StepRecord {
    step: usize,
    op: &'static str,
    mode: &'static str,
    attached: bool,
    nmi: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

struct Stepper {
    bus: C64Bus,
    saved: Option<Vec<u8>>,
}

impl Stepper {
    fn new(bus: C64Bus) -> Self {
        Self { bus, saved: None }
    }

    fn run_step(&mut self, index: usize, step: &Step) -> StepRecord {
        let mut value = None;
        let mut error = None;

        match *step {
            Step::Store { addr, value: data } => self.bus.cpu_bus_write(addr, data),
            Step::Read { addr } => value = Some(self.bus.cpu_bus_read(addr)),
            Step::Freeze => self.bus.press_freeze(),
            Step::Reset => self.bus.reset(),
            Step::Save => match self.save() {
                Ok(raw) => self.saved = Some(raw),
                Err(e) => error = Some(e.to_string()),
            },
            Step::Restore => {
                if let Err(e) = self.restore() {
                    error = Some(e.to_string());
                }
            }
            Step::Detach => self.bus.detach_cartridge(),
        }

        StepRecord {
            step: index,
            op: step.name(),
            mode: match self.bus.cart_mode() {
                VisibilityMode::Mapped => "mapped",
                VisibilityMode::Disabled => "disabled",
            },
            attached: self.bus.cartridge().is_some(),
            nmi: self.bus.take_nmi(),
            value,
            error,
        }
    }

    fn save(&self) -> Result<Vec<u8>> {
        let mut snapshot = Snapshot::new(gamekiller_core::c64::MACHINE_NAME)?;
        self.bus.write_snapshot(&mut snapshot)?;
        Ok(snapshot.to_bytes())
    }

    fn restore(&mut self) -> Result<()> {
        let Some(raw) = self.saved.as_deref() else {
            bail!("nothing saved");
        };
        let snapshot = Snapshot::from_bytes(raw)?;
        self.bus.read_snapshot(&snapshot)?;
        Ok(())
    }
}

fn attach(bus: &mut C64Bus, script: &Script) -> Result<()> {
    let data = match &script.image {
        Some(path) => {
            fs::read(path).with_context(|| format!("reading {}", path.display()))?
        }
        None => pattern_image(),
    };
    match script.format {
        ImageFormat::Bin => bus.attach_bin(&data)?,
        ImageFormat::Crt => bus.attach_crt(&mut Cursor::new(data))?,
    }
    Ok(())
}

fn run_script(script: &Script) -> Result<Vec<StepRecord>> {
    let mut bus = C64Bus::new();
    attach(&mut bus, script)?;

    let mut stepper = Stepper::new(bus);
    Ok(script
        .steps
        .iter()
        .enumerate()
        .map(|(i, step)| stepper.run_step(i, step))
        .collect())
}

fn main() -> Result<()> {
    let Some(path) = env::args().nth(1) else {
        eprintln!("Usage: gamekiller-step <script.json>");
        std::process::exit(1);
    };

    let text = fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let script: Script = serde_json::from_str(&text).context("parsing script")?;

    for record in run_script(&script)? {
        println!("{}", serde_json::to_string(&record)?);
    }
    gamekiller_core::trace_dump!();
    Ok(())
}
