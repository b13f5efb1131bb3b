//! Observation sinks for different use cases

use std::cell::RefCell;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::rc::Rc;

use crate::ls_interface::{
    NodeId, Observation, ObservationSink, PacketId, SimTime, RECEIVE_EVENT,
};

/// One line of the event trace in the classic fixed-width layout
pub fn trace_line(time: SimTime, observation: &Observation) -> Option<String> {
    let Observation::EventTriggered {
        tag,
        sender,
        receiver,
        packet,
        src,
        dst,
        prev,
        next,
    } = observation
    else {
        return None;
    };
    let (label, actor) = if *tag == RECEIVE_EVENT {
        ("recID", receiver)
    } else {
        ("senID", sender)
    };
    let packet = packet.map_or_else(|| "-".to_string(), |p| p.to_string());
    Some(format!(
        "time {:>11}   {} {:>11}   pktID{:>11}   srcID {:>11}   dstID{:>11}   preID{:>11}   nexID{:>11}",
        time, label, actor, packet, src, dst, prev, next
    ))
}

// ============================================================================
// Console Sink
// ============================================================================

/// Prints result lines to stdout; with `verbose` the event trace as well
pub struct ConsoleSink {
    verbose: bool,
}

impl ConsoleSink {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ObservationSink for ConsoleSink {
    fn observe(&mut self, time: SimTime, node: NodeId, observation: Observation) {
        if let Some(line) = observation.output_line() {
            println!("{}", line);
            return;
        }
        if !self.verbose {
            return;
        }
        match &observation {
            Observation::EventTriggered { .. } => {
                if let Some(line) = trace_line(time, &observation) {
                    println!("{}", line);
                }
            }
            Observation::ProxyStored { host, proxy } => {
                println!("{:>11} node {} stores proxy {} for host {}", time, node, proxy, host);
            }
            Observation::WalkFinished { packet, reason } => {
                println!("{:>11} node {} ends walk of packet {}: {}", time, node, packet, reason);
            }
            Observation::Failure { error } => {
                println!("{:>11} node {} error: {}", time, node, error);
            }
            Observation::ProxyFound { .. } | Observation::ProxyNotFound { .. } => {}
        }
    }
}

// ============================================================================
// CSV Sink
// ============================================================================

/// CSV export of every observation; a buffered file writer flushes on drop
pub struct CsvSink<W: Write> {
    writer: W,
}

impl CsvSink<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        Self::new(BufWriter::new(File::create(path)?))
    }
}

impl<W: Write> CsvSink<W> {
    pub fn new(mut writer: W) -> std::io::Result<Self> {
        writeln!(writer, "time,node,kind,sender,receiver,packet,src,dst,prev,next,details")?;
        Ok(Self { writer })
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ObservationSink for CsvSink<W> {
    fn observe(&mut self, time: SimTime, node: NodeId, observation: Observation) {
        let result = match observation {
            Observation::EventTriggered {
                tag,
                sender,
                receiver,
                packet,
                src,
                dst,
                prev,
                next,
            } => writeln!(
                self.writer,
                "{},{},{},{},{},{},{},{},{},{},",
                time,
                node,
                tag,
                sender,
                receiver,
                packet.map_or_else(String::new, |p| p.to_string()),
                src,
                dst,
                prev,
                next
            ),
            Observation::ProxyStored { host, proxy } => writeln!(
                self.writer,
                "{},{},proxy_stored,,,,,,,,host={} proxy={}",
                time, node, host, proxy
            ),
            Observation::ProxyFound { host, proxy } => writeln!(
                self.writer,
                "{},{},proxy_found,,,,,,,,host={} proxy={}",
                time, node, host, proxy
            ),
            Observation::ProxyNotFound { host } => writeln!(
                self.writer,
                "{},{},proxy_not_found,,,,,,,,host={}",
                time, node, host
            ),
            Observation::WalkFinished { packet, reason } => writeln!(
                self.writer,
                "{},{},walk_finished,,,{},,,,,{}",
                time, node, packet, reason
            ),
            Observation::Failure { error } => writeln!(
                self.writer,
                "{},{},failure,,,,,,,,\"{}\"",
                time, node, error
            ),
        };

        if let Err(e) = result {
            log::error!("failed to write CSV record: {}", e);
        }
    }
}

// ============================================================================
// Recording Sink (In-Memory)
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub time: SimTime,
    pub node: NodeId,
    pub observation: Observation,
}

/// `(time, tag, sender, receiver, packet)` of a triggered event
pub type TraceEntry = (SimTime, &'static str, NodeId, NodeId, Option<PacketId>);

/// Keeps observations in memory. Clones share the same buffer, so one clone
/// can be handed to the simulation and another kept for inspection.
#[derive(Clone, Default)]
pub struct RecordingSink {
    records: Rc<RefCell<Vec<Record>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    pub fn records(&self) -> Vec<Record> {
        self.records.borrow().clone()
    }

    pub fn for_node(&self, node: NodeId) -> Vec<Record> {
        self.records
            .borrow()
            .iter()
            .filter(|r| r.node == node)
            .cloned()
            .collect()
    }

    /// Result lines in the order they were produced
    pub fn output_lines(&self) -> Vec<String> {
        self.records
            .borrow()
            .iter()
            .filter_map(|r| r.observation.output_line())
            .collect()
    }

    pub fn trace(&self) -> Vec<TraceEntry> {
        self.records
            .borrow()
            .iter()
            .filter_map(|r| match r.observation {
                Observation::EventTriggered {
                    tag,
                    sender,
                    receiver,
                    packet,
                    ..
                } => Some((r.time, tag, sender, receiver, packet)),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.records.borrow_mut().clear();
    }
}

impl ObservationSink for RecordingSink {
    fn observe(&mut self, time: SimTime, node: NodeId, observation: Observation) {
        self.records.borrow_mut().push(Record {
            time,
            node,
            observation,
        });
    }
}

// ============================================================================
// Multi Sink
// ============================================================================

/// Fans every observation out to several sinks
#[derive(Default)]
pub struct MultiSink {
    sinks: Vec<Box<dyn ObservationSink>>,
}

impl MultiSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sink(&mut self, sink: Box<dyn ObservationSink>) {
        self.sinks.push(sink);
    }
}

impl ObservationSink for MultiSink {
    fn observe(&mut self, time: SimTime, node: NodeId, observation: Observation) {
        for sink in &mut self.sinks {
            sink.observe(time, node, observation.clone());
        }
    }
}
