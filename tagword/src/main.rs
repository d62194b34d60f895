use clap::{Parser as ClapParser, Subcommand, ValueEnum};
use std::process;

use tagword::{
    Entity, Payload, ProbeConfig, ProbeReport, Strategy, TaggedPointer,
    TaggedValue, probe, probe_all,
};

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Allocate objects in a loop and check their address alignment
    Probe {
        #[arg(long, value_enum, default_value_t = PayloadArg::Entity)]
        payload: PayloadArg,

        #[arg(long, value_enum, default_value_t = StrategyArg::Boxed)]
        strategy: StrategyArg,

        #[arg(long, default_value_t = 1_000_000)]
        iterations: usize,

        /// Addresses are reduced modulo this power of two
        #[arg(long, default_value_t = 8)]
        modulus: usize,

        /// Run every payload with every strategy
        #[arg(long, help = "Probe all payload/strategy pairs")]
        all: bool,
    },
    /// Tag a live pointer and an integer and print the packed words
    Demo,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PayloadArg {
    Scalar,
    Entity,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StrategyArg {
    Boxed,
    Shared,
    Atomic,
    Raw,
}

impl From<PayloadArg> for Payload {
    fn from(value: PayloadArg) -> Self {
        match value {
            PayloadArg::Scalar => Payload::Scalar,
            PayloadArg::Entity => Payload::Entity,
        }
    }
}

impl From<StrategyArg> for Strategy {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::Boxed => Strategy::Boxed,
            StrategyArg::Shared => Strategy::Shared,
            StrategyArg::Atomic => Strategy::Atomic,
            StrategyArg::Raw => Strategy::Raw,
        }
    }
}

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Probe {
            payload,
            strategy,
            iterations,
            modulus,
            all,
        } => {
            let reports = if all {
                probe_all(iterations, modulus)
            } else {
                probe(&ProbeConfig {
                    payload: payload.into(),
                    strategy: strategy.into(),
                    iterations,
                    modulus,
                })
                .map(|report| vec![report])
            };

            let reports = match reports {
                Ok(reports) => reports,
                Err(err) => {
                    eprintln!("Error probing allocations: {}", err);
                    process::exit(1);
                }
            };

            for report in &reports {
                print_report(report);
            }

            if !reports.iter().all(ProbeReport::is_aligned) {
                process::exit(1);
            }
        }
        Command::Demo => run_demo(),
    }
}

fn print_report(report: &ProbeReport) {
    println!(
        "{:<8} {:<8} {:>10} {:>8}",
        report.config.payload.name(),
        report.config.strategy.name(),
        report.residue_sum,
        report.misaligned
    );
}

fn run_demo() {
    let mut entity = Box::new(Entity { x: 12 });
    let raw: *mut Entity = &mut *entity;
    println!("entity  {:p}", raw);

    let tagged = match TaggedPointer::<Entity, 8>::try_new(raw, 5) {
        Ok(tagged) => tagged,
        Err(err) => {
            eprintln!("Error tagging pointer: {}", err);
            process::exit(1);
        }
    };
    println!(
        "pointer {:#018x} -> {:p} tag {}",
        tagged.raw(),
        tagged.as_ptr(),
        tagged.tag()
    );

    let mut value = match TaggedValue::<Entity, 8>::try_from_pointer(raw, 3) {
        Ok(value) => value,
        Err(err) => {
            eprintln!("Error tagging pointer: {}", err);
            process::exit(1);
        }
    };
    println!("value   {:#018x} -> {:?}", value.raw(), value);

    value.set_int(123456789);
    println!("value   {:#018x} -> {:?}", value.raw(), value);
}
