//! Device-side variable storage shared by the command and stream loops.

use std::f64::consts::TAU;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use linkprobe_payload::{DataType, VariableDescriptor};

#[derive(Debug)]
struct Entry {
    descriptor: VariableDescriptor,
    value: f64,
    /// Set once a client writes the variable; waveforms stop touching it.
    held: bool,
}

/// The variables a simulated device exposes, with their live values.
///
/// Descriptors are fixed at construction. Values change through
/// [`write`](Self::write) and the time-driven [`tick`](Self::tick). One lock
/// guards the whole table; every update is a single scalar replacement.
#[derive(Debug)]
pub struct VariableRegistry {
    entries: Mutex<Vec<Entry>>,
    started: Instant,
}

/// The table served when no other source is configured.
pub fn default_variables() -> Vec<(VariableDescriptor, f64)> {
    vec![
        (
            VariableDescriptor::new("g_motor_speed", 0x2000_1000, DataType::Float32).with_unit("rpm"),
            1200.0,
        ),
        (
            VariableDescriptor::new("g_bus_voltage", 0x2000_1004, DataType::Float32).with_unit("V"),
            24.2,
        ),
        (
            VariableDescriptor::new("g_temp", 0x2000_1008, DataType::Float32).with_unit("C"),
            36.5,
        ),
        (
            VariableDescriptor::new("g_iq_ref", 0x2000_100C, DataType::Float32).with_unit("A"),
            1.2,
        ),
    ]
}

impl Default for VariableRegistry {
    fn default() -> Self {
        Self::new(default_variables())
    }
}

impl VariableRegistry {
    /// Build from descriptors and initial values. Later duplicates of an
    /// address are ignored.
    pub fn new(variables: Vec<(VariableDescriptor, f64)>) -> Self {
        let mut entries: Vec<Entry> = Vec::with_capacity(variables.len());
        for (descriptor, value) in variables {
            if entries
                .iter()
                .any(|e| e.descriptor.address == descriptor.address)
            {
                continue;
            }
            entries.push(Entry {
                descriptor,
                value,
                held: false,
            });
        }
        Self {
            entries: Mutex::new(entries),
            started: Instant::now(),
        }
    }

    /// Build from descriptors with every value at zero.
    pub fn from_descriptors(descriptors: Vec<VariableDescriptor>) -> Self {
        Self::new(descriptors.into_iter().map(|d| (d, 0.0)).collect())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn descriptors(&self) -> Vec<VariableDescriptor> {
        self.lock().iter().map(|e| e.descriptor.clone()).collect()
    }

    /// Type and current value at `address`.
    pub fn read(&self, address: u32) -> Option<(DataType, f64)> {
        self.lock()
            .iter()
            .find(|e| e.descriptor.address == address)
            .map(|e| (e.descriptor.data_type, e.value))
    }

    /// Store `raw`, decoded by the variable's type, and hold the value.
    ///
    /// Returns `false` for unknown addresses and for raw values shorter than
    /// the variable's width.
    pub fn write(&self, address: u32, raw: &[u8]) -> bool {
        let mut entries = self.lock();
        let Some(entry) = entries.iter_mut().find(|e| e.descriptor.address == address) else {
            return false;
        };
        match entry.descriptor.data_type.decode_value(raw) {
            Some(value) => {
                entry.value = value;
                entry.held = true;
                true
            }
            None => false,
        }
    }

    /// Advance every unwritten variable's waveform to now.
    pub fn tick(&self) {
        self.tick_at(self.started.elapsed().as_secs_f64());
    }

    /// Advance every unwritten variable's waveform to `t` seconds.
    ///
    /// The waveform is picked from the name: speed, temperature, voltage and
    /// current each get a plausible signal around a typical operating point;
    /// anything else is a small sine.
    pub fn tick_at(&self, t: f64) {
        for (idx, entry) in self.lock().iter_mut().enumerate() {
            if !entry.held {
                entry.value = waveform(&entry.descriptor.name, idx as f64, t);
            }
        }
    }
}

fn waveform(name: &str, phase: f64, t: f64) -> f64 {
    let name = name.to_ascii_lowercase();
    if name.contains("speed") {
        1500.0 + 220.0 * (TAU * 0.4 * t).sin()
    } else if name.contains("temp") {
        35.0 + 4.0 * (TAU * 0.02 * t + phase).sin()
    } else if name.contains("volt") {
        24.0 + 0.6 * (TAU * 0.7 * t).sin()
    } else if name.contains("curr") || name.contains("iq") {
        1.2 + 0.25 * (TAU * 1.2 * t + phase).sin()
    } else {
        0.5 * (TAU * 0.5 * t + phase).sin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table() {
        let registry = VariableRegistry::default();
        assert_eq!(registry.len(), 4);
        assert_eq!(registry.descriptors()[0].name, "g_motor_speed");
        assert_eq!(
            registry.read(0x2000_1004),
            Some((DataType::Float32, 24.2))
        );
        assert_eq!(registry.read(0x1234), None);
    }

    #[test]
    fn write_decodes_by_type_and_holds() {
        let registry = VariableRegistry::new(vec![
            (VariableDescriptor::new("g_speed", 0x100, DataType::Float32), 0.0),
            (VariableDescriptor::new("g_s2_pos", 0x104, DataType::Int16), 0.0),
        ]);
        assert!(registry.write(0x100, &42.5f32.to_le_bytes()));
        assert!(registry.write(0x104, &(-12i16).to_le_bytes()));
        registry.tick_at(3.0);
        assert_eq!(registry.read(0x100), Some((DataType::Float32, 42.5)));
        assert_eq!(registry.read(0x104), Some((DataType::Int16, -12.0)));
    }

    #[test]
    fn invalid_writes_are_ignored() {
        let registry = VariableRegistry::default();
        assert!(!registry.write(0xDEAD_BEEF, &1.0f32.to_le_bytes()));
        assert!(!registry.write(0x2000_1000, &[0x01, 0x02]));
        assert_eq!(registry.read(0x2000_1000), Some((DataType::Float32, 1200.0)));
    }

    #[test]
    fn waveforms_follow_names() {
        let registry = VariableRegistry::default();
        registry.tick_at(0.0);
        let speed = registry.read(0x2000_1000).unwrap().1;
        let volts = registry.read(0x2000_1004).unwrap().1;
        let temp = registry.read(0x2000_1008).unwrap().1;
        let iq = registry.read(0x2000_100C).unwrap().1;
        assert!((speed - 1500.0).abs() < 1e-9);
        assert!((volts - 24.0).abs() < 1e-9);
        assert!((31.0..=39.0).contains(&temp));
        assert!((0.95..=1.45).contains(&iq));
    }

    #[test]
    fn duplicate_addresses_keep_first() {
        let registry = VariableRegistry::new(vec![
            (VariableDescriptor::new("a", 0x10, DataType::UInt8), 1.0),
            (VariableDescriptor::new("b", 0x10, DataType::UInt8), 2.0),
        ]);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.descriptors()[0].name, "a");
    }
}
