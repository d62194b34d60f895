//! Allocation alignment probe.
//!
//! Repeatedly allocates a payload, records `address % modulus` and frees it
//! again. A residue sum of zero means every address had its low bits free,
//! which is what [`TaggedPointer`](crate::TaggedPointer) and
//! [`TaggedValue`](crate::TaggedValue) rely on.
use std::{
    alloc::{self, Layout},
    fmt,
    rc::Rc,
    sync::Arc,
};

use crate::{address_of, is_aligned};

/// Small object used as a probe payload.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(C, align(8))]
pub struct Entity {
    pub x: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    /// A plain `u64`.
    Scalar,
    Entity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// `Box<T>`
    Boxed,
    /// `Rc<T>`
    Shared,
    /// `Arc<T>`
    Atomic,
    /// `std::alloc::alloc` with the alignment raised to the modulus.
    Raw,
}

impl Payload {
    pub const ALL: [Payload; 2] = [Payload::Scalar, Payload::Entity];

    pub fn name(self) -> &'static str {
        match self {
            Payload::Scalar => "scalar",
            Payload::Entity => "entity",
        }
    }
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::Boxed,
        Strategy::Shared,
        Strategy::Atomic,
        Strategy::Raw,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Strategy::Boxed => "boxed",
            Strategy::Shared => "shared",
            Strategy::Atomic => "atomic",
            Strategy::Raw => "raw",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeConfig {
    pub payload: Payload,
    pub strategy: Strategy,
    pub iterations: usize,
    pub modulus: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            payload: Payload::Entity,
            strategy: Strategy::Boxed,
            iterations: 1000,
            modulus: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeReport {
    pub config: ProbeConfig,
    pub allocations: usize,
    /// Sum of `address % modulus` over all allocations.
    pub residue_sum: usize,
    pub misaligned: usize,
    pub first_address: Option<usize>,
    pub last_address: Option<usize>,
}

impl ProbeReport {
    fn new(config: ProbeConfig) -> Self {
        Self {
            config,
            allocations: 0,
            residue_sum: 0,
            misaligned: 0,
            first_address: None,
            last_address: None,
        }
    }

    pub fn is_aligned(&self) -> bool {
        self.misaligned == 0
    }

    fn record(&mut self, address: usize) {
        let residue = address % self.config.modulus;
        if residue != 0 {
            log::warn!(
                "{} {}: address {:#x} is off by {} from a multiple of {}",
                self.config.payload.name(),
                self.config.strategy.name(),
                address,
                residue,
                self.config.modulus
            );
            self.misaligned += 1;
        }
        self.residue_sum += residue;
        self.allocations += 1;
        self.first_address.get_or_insert(address);
        self.last_address = Some(address);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeError {
    /// Zero or not a power of two.
    InvalidModulus(usize),
    OutOfMemory { size: usize, align: usize },
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeError::InvalidModulus(modulus) => {
                write!(f, "modulus {modulus} is not a power of two")
            }
            ProbeError::OutOfMemory { size, align } => write!(
                f,
                "allocation of {size} bytes aligned to {align} failed"
            ),
        }
    }
}

impl std::error::Error for ProbeError {}

pub fn probe(config: &ProbeConfig) -> Result<ProbeReport, ProbeError> {
    if !config.modulus.is_power_of_two() {
        return Err(ProbeError::InvalidModulus(config.modulus));
    }

    log::debug!(
        "probing {} {} x{} modulo {}",
        config.payload.name(),
        config.strategy.name(),
        config.iterations,
        config.modulus
    );

    let report = match config.payload {
        Payload::Scalar => probe_payload(config, || 12u64),
        Payload::Entity => probe_payload(config, || Entity { x: 12 }),
    }?;

    log::info!(
        "{} {}: {} allocations, residue sum {}, {} misaligned",
        config.payload.name(),
        config.strategy.name(),
        report.allocations,
        report.residue_sum,
        report.misaligned
    );
    Ok(report)
}

/// Probe every payload with every strategy.
pub fn probe_all(
    iterations: usize,
    modulus: usize,
) -> Result<Vec<ProbeReport>, ProbeError> {
    let mut reports = Vec::with_capacity(Payload::ALL.len() * Strategy::ALL.len());
    for payload in Payload::ALL {
        for strategy in Strategy::ALL {
            reports.push(probe(&ProbeConfig {
                payload,
                strategy,
                iterations,
                modulus,
            })?);
        }
    }
    Ok(reports)
}

fn probe_payload<T>(
    config: &ProbeConfig,
    make: impl Fn() -> T,
) -> Result<ProbeReport, ProbeError> {
    let mut report = ProbeReport::new(*config);
    for _ in 0..config.iterations {
        let address = match config.strategy {
            Strategy::Boxed => {
                let mut boxed = Box::new(make());
                let ptr: *mut T = &mut *boxed;
                address_of(ptr)
            }
            Strategy::Shared => address_of(Rc::as_ptr(&Rc::new(make())).cast_mut()),
            Strategy::Atomic => address_of(Arc::as_ptr(&Arc::new(make())).cast_mut()),
            Strategy::Raw => raw_address::<T>(config.modulus)?,
        };
        report.record(address);
    }
    Ok(report)
}

fn raw_address<T>(modulus: usize) -> Result<usize, ProbeError> {
    let align = align_of::<T>().max(modulus);
    let size = size_of::<T>().max(1);
    let layout = Layout::from_size_align(size, align)
        .map_err(|_| ProbeError::InvalidModulus(modulus))?;

    // SAFETY: layout has a non-zero size
    let ptr = unsafe { alloc::alloc(layout) };
    if ptr.is_null() {
        return Err(ProbeError::OutOfMemory { size, align });
    }
    let address = address_of(ptr);
    debug_assert!(is_aligned(address, align));
    // SAFETY: allocated above with the same layout
    unsafe { alloc::dealloc(ptr, layout) };
    Ok(address)
}

#[cfg(test)]
mod probe_tests {
    use super::*;

    #[test]
    fn a_thousand_boxed_entities_are_eight_byte_aligned() {
        let report = probe(&ProbeConfig::default()).expect("valid config");
        assert_eq!(report.allocations, 1000);
        assert_eq!(report.residue_sum, 0);
        assert!(report.is_aligned());
    }

    #[test]
    fn every_strategy_honors_the_payload_alignment() {
        let reports = probe_all(1000, 8).expect("valid modulus");
        assert_eq!(reports.len(), 8);
        for report in reports {
            assert_eq!(
                report.residue_sum, 0,
                "{:?} {:?}",
                report.config.payload, report.config.strategy
            );
            assert_eq!(report.allocations, 1000);
        }
    }

    #[test]
    fn raw_strategy_honors_a_larger_modulus() {
        let report = probe(&ProbeConfig {
            payload: Payload::Scalar,
            strategy: Strategy::Raw,
            iterations: 256,
            modulus: 64,
        })
        .expect("valid config");
        assert!(report.is_aligned());
        assert_eq!(report.last_address.map(|a| a % 64), Some(0));
    }

    #[test]
    fn rejects_a_modulus_that_is_not_a_power_of_two() {
        for modulus in [0, 3, 12] {
            let config = ProbeConfig {
                modulus,
                ..ProbeConfig::default()
            };
            assert_eq!(probe(&config), Err(ProbeError::InvalidModulus(modulus)));
        }
    }

    #[test]
    fn zero_iterations_record_nothing() {
        let report = probe(&ProbeConfig {
            iterations: 0,
            ..ProbeConfig::default()
        })
        .expect("valid config");
        assert_eq!(report.allocations, 0);
        assert_eq!(report.first_address, None);
        assert!(report.is_aligned());
    }

    #[test]
    fn record_counts_misaligned_addresses() {
        let mut report = ProbeReport::new(ProbeConfig::default());
        report.record(0x1000);
        report.record(0x1003);
        report.record(0x1006);
        assert_eq!(report.allocations, 3);
        assert_eq!(report.misaligned, 2);
        assert_eq!(report.residue_sum, 9);
        assert_eq!(report.first_address, Some(0x1000));
        assert_eq!(report.last_address, Some(0x1006));
    }

    #[test]
    fn probed_addresses_can_carry_tags() {
        let mut entity = Box::new(Entity { x: 1 });
        let tagged = crate::TaggedPointer::<Entity, 8>::try_new(&mut *entity, 7)
            .expect("boxed entity is eight byte aligned");
        // SAFETY: entity is alive
        assert_eq!(unsafe { tagged.as_ref() }.x, 1);
    }
}
