use log::*;
use shunter::*;
use std::path::PathBuf;
use structopt::StructOpt;

/// Shunter -- trains, cars and signals on a track graph
#[derive(StructOpt, Debug)]
#[structopt(name = "shunter")]
struct Opt {
    /// Verbose mode (-v, -vv)
    #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
    verbose: u8,

    /// Scenario file
    #[structopt(parse(from_os_str))]
    scenario: PathBuf,

    /// Maximum time step, overrides the scenario's run line
    #[structopt(short = "d", long = "time-step")]
    timestep: Option<f64>,

    /// Simulated time, overrides the scenario's run line
    #[structopt(short = "t", long = "duration")]
    duration: Option<f64>,

    /// Output JSON history file
    #[structopt(short = "j", long = "json", parse(from_os_str))]
    json: Option<PathBuf>,

    /// Output node visit times to file
    #[structopt(short = "n", long = "visits", parse(from_os_str))]
    visits: Option<PathBuf>,

    /// Print the final state of every car and engine
    #[structopt(short = "s", long = "snapshot")]
    snapshot: bool,
}

fn run(opt: &Opt) -> AppResult<()> {
    let scenario = get_scenario(&opt.scenario)?;
    debug!("Scenario: {:?}", scenario);

    let (history, names) = run_scenario(&scenario, opt.timestep, opt.duration)?;

    if opt.verbose >= 2 {
        println!("# Infrastructure history:");
        for x in &history.inf {
            println!("> {:?}", x);
        }
        for &(ref name, ref params, ref x) in &history.trains {
            println!("## Train \"{}\" {:?}:", name, params);
            for x in x {
                println!("> {:?}", x);
            }
        }
    }

    println!("Distance moved: {}", history.tracking.distance);
    for (load, amount) in &history.tracking.deliveries {
        println!("Delivered {}: {}", load, amount);
    }
    for a in &history.anomalies {
        println!("Anomaly: {:?}", a);
    }

    if opt.snapshot {
        for car in &history.snapshot.cars {
            println!("car {}.{} {} -> {} at ({:.3}, {:.3}) heading {:.3} remaining {:.3}{}",
                     car.train,
                     car.index,
                     names.node_name(car.current),
                     names.node_name(car.target),
                     car.position.x,
                     car.position.y,
                     car.heading,
                     car.remaining,
                     if car.limbo { " limbo" } else { "" });
        }
        for e in &history.snapshot.engines {
            println!("engine {} speed {:.3} {:?} stop {:?} slow {:?}",
                     e.train,
                     e.speed,
                     e.throttle,
                     e.stop.signal_id().map(|s| names.signal_name(s)),
                     e.slow.signal_id().map(|s| names.signal_name(s)));
        }
    }

    if let Some(ref json) = opt.json {
        use std::fs::File;
        use std::io::BufWriter;
        let file = File::create(json)?;
        let mut writer = BufWriter::new(&file);
        shunter::output::json::json_history(&names, &history, &mut writer)?;
    }

    if let Some(ref visits) = opt.visits {
        use std::fs::File;
        use std::io::BufWriter;
        use std::io::Write;
        let file = File::create(visits)?;
        let mut writer = BufWriter::new(&file);
        let string = shunter::output::history::visits(&names, &history)?;
        write!(writer, "{}", string)?;
    }

    Ok(())
}

pub fn main() {
    let opt = Opt::from_args();
    let level = match opt.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    if let Err(e) = simple_logger::SimpleLogger::new().with_level(level).init() {
        eprintln!("Could not set up logging: {}", e);
    }
    info!("{:?}", opt);

    match run(&opt) {
        Ok(()) => {}
        Err(e) => {
            println!("Error:\n{}", e.as_fail());
            std::process::exit(1);
        }
    }
}
