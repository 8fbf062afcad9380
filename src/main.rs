use anyhow::{Context, Result};
use gamekiller_core::prelude::*;
use gamekiller_core::c64::MACHINE_NAME;
use std::env;
use std::fs;
use std::io::Cursor;
use std::process;

enum Action {
    Store { addr: u16, value: u8 },
    Read { addr: u16 },
    Freeze,
    Reset,
    Save { path: String },
    Restore { path: String },
    Detach,
}

struct Options {
    cart_path: Option<String>,
    crt: bool,
    actions: Vec<Action>,
    verbose: bool,
}

fn parse_args() -> Options {
    let mut args = env::args().skip(1);
    let mut cart_path: Option<String> = None;
    let mut crt = false;
    let mut actions = Vec::new();
    let mut verbose = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" | "--crt" => crt = true,
            "-s" | "--store" => {
                let val = args.next().unwrap_or_default();
                let (addr, value) = match val.split_once('=') {
                    Some((addr, value)) => (addr, parse_u16(value, "store value")),
                    None => (val.as_str(), 0),
                };
                actions.push(Action::Store {
                    addr: parse_u16(addr, "store address"),
                    value: (value & 0xFF) as u8,
                });
            }
            "-r" | "--read" => {
                let val = args.next().unwrap_or_default();
                actions.push(Action::Read {
                    addr: parse_u16(&val, "read address"),
                });
            }
            "-f" | "--freeze" => actions.push(Action::Freeze),
            "--reset" => actions.push(Action::Reset),
            "--detach" => actions.push(Action::Detach),
            "--save" => actions.push(Action::Save {
                path: args.next().unwrap_or_else(|| print_usage_and_exit()),
            }),
            "--restore" => actions.push(Action::Restore {
                path: args.next().unwrap_or_else(|| print_usage_and_exit()),
            }),
            "-v" | "--verbose" => verbose = true,
            _ => {
                if cart_path.is_none() && !arg.starts_with('-') {
                    cart_path = Some(arg);
                } else {
                    eprintln!("Unexpected argument: {arg}");
                    print_usage_and_exit();
                }
            }
        }
    }

    if cart_path.is_none() && !actions.iter().any(|a| matches!(a, Action::Restore { .. })) {
        eprintln!("Missing cartridge path (or --restore).");
        print_usage_and_exit();
    }

    Options {
        cart_path,
        crt,
        actions,
        verbose,
    }
}

fn parse_u16(value: &str, name: &str) -> u16 {
    let parsed = if let Some(hex) = value
        .strip_prefix('$')
        .or_else(|| value.strip_prefix("0x"))
        .or_else(|| value.strip_prefix("0X"))
    {
        u16::from_str_radix(hex, 16)
    } else {
        value.parse::<u16>()
    };
    parsed.unwrap_or_else(|_| {
        eprintln!("Invalid {name}: {value}");
        print_usage_and_exit();
    })
}

fn print_usage_and_exit() -> ! {
    eprintln!("Usage: gamekiller <cart_path> [options] [actions...]");
    eprintln!("   or: gamekiller --restore <snapshot> [actions...]");
    eprintln!("Options:");
    eprintln!("  -c, --crt                   Cartridge file is a CRT CHIP packet");
    eprintln!("  -v, --verbose               Debug logging (RUST_LOG overrides)");
    eprintln!("Actions (run in order):");
    eprintln!("  -s, --store <addr[=value]>  CPU store, e.g. $DE00=0");
    eprintln!("  -r, --read <addr>           CPU read, prints the value");
    eprintln!("  -f, --freeze                Press the freeze button");
    eprintln!("      --reset                 Machine reset");
    eprintln!("      --detach                Remove the cartridge");
    eprintln!("      --save <path>           Write a snapshot");
    eprintln!("      --restore <path>        Replace the cartridge from a snapshot");
    process::exit(2);
}

fn run_action(bus: &mut C64Bus, action: &Action) -> Result<()> {
    match action {
        Action::Store { addr, value } => {
            bus.cpu_bus_write(*addr, *value);
            log::debug!("store ${addr:04X} <- ${value:02X}");
        }
        Action::Read { addr } => {
            let value = bus.cpu_bus_read(*addr);
            println!("${addr:04X} = ${value:02X}");
        }
        Action::Freeze => bus.press_freeze(),
        Action::Reset => bus.reset(),
        Action::Detach => bus.detach_cartridge(),
        Action::Save { path } => {
            let mut snapshot = Snapshot::new(MACHINE_NAME)?;
            bus.write_snapshot(&mut snapshot)?;
            fs::write(path, snapshot.to_bytes()).with_context(|| format!("writing {path}"))?;
            log::info!("Snapshot written to {path}");
        }
        Action::Restore { path } => {
            let raw = fs::read(path).with_context(|| format!("reading {path}"))?;
            let snapshot = Snapshot::from_bytes(&raw).with_context(|| format!("parsing {path}"))?;
            bus.read_snapshot(&snapshot)
                .with_context(|| format!("restoring from {path}"))?;
        }
    }
    if bus.take_nmi() {
        println!("NMI");
    }
    Ok(())
}

fn run(opts: &Options) -> Result<()> {
    let mut bus = C64Bus::new();

    if let Some(path) = &opts.cart_path {
        let data = fs::read(path).with_context(|| format!("reading cartridge {path}"))?;
        let attached = if opts.crt {
            bus.attach_crt(&mut Cursor::new(data))
        } else {
            bus.attach_bin(&data)
        };
        attached.with_context(|| format!("attaching {path}"))?;
    }

    for action in &opts.actions {
        run_action(&mut bus, action)?;
    }

    println!("Mode: {:?}", bus.cart_mode());
    println!("Cartridges: {}", bus.export_listing().join(", "));
    if opts.verbose {
        let lo = bus.cpu_bus_read(0xFFFC);
        let hi = bus.cpu_bus_read(0xFFFD);
        println!("Reset vector: ${:04X}", u16::from_le_bytes([lo, hi]));
        println!("Freeze locked: {}", bus.port.freeze_locked);
    }
    gamekiller_core::trace_dump!();
    Ok(())
}

fn main() {
    let opts = parse_args();

    let level = if opts.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    if let Err(err) = run(&opts) {
        eprintln!("Error: {err:#}");
        process::exit(1);
    }
}
