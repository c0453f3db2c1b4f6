use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use netsim_core::{
    DeviceId, DeviceKind, NetError, PowerState, Simulator, SimulatorConfig, Terminal,
    Topology, TopologyStore,
};

/// Opens a terminal on one device of a simulated network.
#[derive(Parser, Debug)]
#[command(name = "netsim", version, about)]
struct Args {
    /// Topology file to load. A small two-host LAN is built when omitted.
    #[arg(short, long)]
    topology: Option<PathBuf>,

    /// Device to attach to, by id or name. Defaults to the first host.
    #[arg(short, long)]
    device: Option<String>,

    /// Seed for jitter and loss decisions.
    #[arg(long)]
    seed: Option<u64>,

    /// Per-invocation timeout in simulated milliseconds.
    #[arg(long, default_value_t = 2_000)]
    timeout_ms: u64,

    /// Run these commands and exit instead of reading stdin.
    #[arg(short = 'c', long = "command")]
    commands: Vec<String>,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            eprintln!("netsim: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), NetError> {
    let store = match &args.topology {
        Some(path) => {
            info!("loading {}", path.display());
            TopologyStore::from_topology(Topology::load(path)?)
        }
        None => demo_lan(args.seed)?,
    };
    let topology = store.snapshot();

    let device = pick_device(&topology, args.device.as_deref())?;
    let mut config = SimulatorConfig::default().with_timeout_us(args.timeout_ms * 1_000);
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }
    let sim = Simulator::new(config);
    let terminal = Terminal::new(device.clone());

    let mut stdout = io::stdout().lock();
    if !args.commands.is_empty() {
        for line in &args.commands {
            print_lines(&mut stdout, &terminal.run(&sim, &topology, line))?;
        }
        return Ok(());
    }

    print_lines(&mut stdout, &terminal.banner(&topology))?;
    let prompt = topology
        .device(&device)
        .map_or_else(|| device.to_string(), |d| d.name.clone());
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut line = String::new();
    loop {
        write!(stdout, "{prompt}$ ")?;
        stdout.flush()?;
        line.clear();
        if input.read_line(&mut line)? == 0 {
            break;
        }
        match line.trim() {
            "exit" | "quit" => break,
            "clear" => write!(stdout, "\x1b[2J\x1b[H")?,
            command => print_lines(&mut stdout, &terminal.run(&sim, &topology, command))?,
        }
    }
    Ok(())
}

fn print_lines(out: &mut impl Write, lines: &[String]) -> io::Result<()> {
    for line in lines {
        writeln!(out, "{line}")?;
    }
    Ok(())
}

fn pick_device(topology: &Topology, wanted: Option<&str>) -> Result<DeviceId, NetError> {
    let found = match wanted {
        Some(key) => topology
            .device(&DeviceId::from(key))
            .or_else(|| topology.device_by_name(key)),
        None => topology.devices.iter().find(|d| d.kind == DeviceKind::Host),
    };
    found
        .map(|d| d.id.clone())
        .ok_or_else(|| NetError::UnknownDevice(DeviceId::from(wanted.unwrap_or("<host>"))))
}

/// Two hosts behind a switch, with a router as their gateway.
fn demo_lan(seed: Option<u64>) -> Result<TopologyStore, NetError> {
    let store = seed.map_or_else(TopologyStore::new, TopologyStore::with_seed);
    let (pc1, _) = store.add_device(DeviceKind::Host);
    let (pc2, _) = store.add_device(DeviceKind::Host);
    let (sw, _) = store.add_device(DeviceKind::Switch);
    let (r1, _) = store.add_device(DeviceKind::Router);

    store.connect(&pc1, "Ethernet0", &sw, "FastEthernet0/0")?;
    store.connect(&pc2, "Ethernet0", &sw, "FastEthernet0/1")?;
    store.connect(&r1, "GigabitEthernet0/0", &sw, "FastEthernet0/2")?;

    store.set_interface_address(&pc1, "Ethernet0", "192.168.1.10", "255.255.255.0")?;
    store.set_interface_address(&pc2, "Ethernet0", "192.168.1.11", "255.255.255.0")?;
    store.set_interface_address(&r1, "GigabitEthernet0/0", "192.168.1.1", "255.255.255.0")?;
    store.set_gateway(&pc1, "Ethernet0", Some("192.168.1.1"))?;
    store.set_gateway(&pc2, "Ethernet0", Some("192.168.1.1"))?;

    for id in [&pc1, &pc2, &sw, &r1] {
        store.set_power(id, PowerState::On)?;
    }
    Ok(store)
}
