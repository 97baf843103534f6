//! Disruption handling: catch regions, unwinding and uncaught faults.

use crate::error::{Disruption, RuntimeFault, TraceFrame};
use crate::particle::{Instance, ObjRef, Object, Particle};
use crate::span::source_line;

use super::vm::Atomizer;

impl Atomizer {
    /// Route a disruption to the innermost catch region.
    ///
    /// Gives the disruption back when it is fatal or no region is open.
    pub(crate) fn catch_disruption(&mut self, disruption: Disruption) -> Result<(), Disruption> {
        if disruption.fatal {
            return Err(disruption);
        }
        let Some(region) = self.catch_regions.pop() else {
            return Err(disruption);
        };

        // Unwind call frames opened inside the region
        while self.frames.len() > region.frame_depth {
            if let Some(frame) = self.frames.pop() {
                self.close_upvalues(frame.base)?;
            }
        }

        self.close_upvalues(region.stack_height)?;
        self.stack.truncate(region.stack_height);

        let instance = self.disruption_instance(&disruption);
        self.push(Particle::Obj(instance))?;
        self.frame_mut()?.ip = region.catch_ip;
        Ok(())
    }

    /// A `Disruption` instance carrying `message` and `code` fields.
    pub(crate) fn disruption_instance(&mut self, disruption: &Disruption) -> ObjRef {
        let message = self.heap.intern(&disruption.message);
        let mut instance = Instance::new(self.disruption_model);
        instance
            .fields
            .insert(self.sentinels.message, Particle::Obj(message));
        instance.fields.insert(
            self.sentinels.code,
            Particle::Number(disruption.code as u8 as f64),
        );
        self.heap.alloc(Object::Instance(instance))
    }

    /// Capture the call trace for an uncaught disruption and reset the machine.
    pub(crate) fn escape(&mut self, disruption: Disruption) -> RuntimeFault {
        let trace = self
            .frames
            .iter()
            .rev()
            .take(self.config.trace_lookback)
            .filter_map(|frame| {
                let reaction = self.heap.reaction(frame.reaction).ok()?;
                let line = reaction.chunk.get_line(frame.ip.saturating_sub(1)) as usize;
                Some(TraceFrame {
                    line,
                    function: reaction.name.map(|name| self.heap.name(name).to_string()),
                    source: source_line(&self.source, line).to_string(),
                })
            })
            .collect();

        self.reset();
        RuntimeFault { disruption, trace }
    }

    /// Drop every frame and operand; globals survive.
    pub(crate) fn reset(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues.clear();
        self.catch_regions.clear();
    }
}
