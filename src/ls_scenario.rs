// Scenario files
//
// Two input formats describe the same thing: a node count, links, a run
// duration and the publish/subscribe requests to seed.
//
// YAML:
//   meta: { name: ..., description: ... }
//   config: { hop_delay: 10, duplicate_hilltop: stop }
//   duration: 1000
//   topology: { kind: line, nodes: 5 }
//   publishes:  [ { time: 0, node: 0, proxy: 99 } ]
//   subscribes: [ { time: 100, node: 4, host: 0 } ]
//
// Text (whitespace separated, as read from stdin):
//   <nodes> <links> <duration>
//   <link id> <a> <b>            (one per link)
//   <publishers>
//   <time> <node> <proxy>        (one per publisher)
//   <subscribers>
//   <time> <node> <host>         (one per subscriber)

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ls_config::SimConfig;
use crate::ls_error::SimError;
use crate::ls_interface::{NodeId, ObservationSink, SimTime};
use crate::ls_simulation::{RunSummary, Simulation};

/// Upper bound on capacity reserved from a count read out of a text file
const MAX_PREALLOCATED: usize = 1024;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("line {line}: {msg}")]
    Parse { line: usize, msg: String },

    #[error("invalid scenario: {0}")]
    Invalid(String),

    #[error(transparent)]
    Sim(#[from] SimError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioMeta {
    pub name: Option<String>,
    pub description: Option<String>,
    pub hypothesis: Option<String>,
}

/// How the nodes `0..nodes` are linked; every link is undirected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TopologySpec {
    /// Explicit link list
    Links {
        nodes: NodeId,
        #[serde(default)]
        links: Vec<(NodeId, NodeId)>,
    },

    /// 0 - 1 - 2 - ... - (nodes - 1)
    Line { nodes: NodeId },

    /// Ring with `neighbors` links on each side
    Ring {
        nodes: NodeId,
        #[serde(default = "default_ring_neighbors")]
        neighbors: NodeId,
    },

    /// width x height mesh, ids row by row
    Grid { width: NodeId, height: NodeId },

    /// Every pair linked with probability `connectivity` (0.0 to 1.0)
    Random {
        nodes: NodeId,
        connectivity: f64,
        #[serde(default)]
        seed: u64,
    },
}

fn default_ring_neighbors() -> NodeId {
    1
}

impl TopologySpec {
    pub fn node_count(&self) -> Result<NodeId, ScenarioError> {
        match self {
            TopologySpec::Links { nodes, .. }
            | TopologySpec::Line { nodes }
            | TopologySpec::Ring { nodes, .. }
            | TopologySpec::Random { nodes, .. } => Ok(*nodes),
            TopologySpec::Grid { width, height } => width.checked_mul(*height).ok_or_else(|| {
                ScenarioError::Invalid(format!("grid {}x{} has too many nodes", width, height))
            }),
        }
    }

    /// The generated link list; random topologies are reproducible per seed
    pub fn links(&self) -> Result<Vec<(NodeId, NodeId)>, ScenarioError> {
        let links = match self {
            TopologySpec::Links { links, .. } => links.clone(),
            TopologySpec::Line { nodes } => (1..*nodes).map(|i| (i - 1, i)).collect(),
            TopologySpec::Ring { nodes, neighbors } => {
                let n = *nodes;
                // beyond n - 1 the offsets wrap onto links already made
                let reach = (*neighbors).min(n.saturating_sub(1));
                let mut links = Vec::new();
                for i in 0..n {
                    for k in 1..=reach {
                        let j = ((u64::from(i) + u64::from(k)) % u64::from(n)) as NodeId;
                        if i != j {
                            links.push((i, j));
                        }
                    }
                }
                links
            }
            TopologySpec::Grid { width, height } => {
                // every id below is under width * height
                self.node_count()?;
                let mut links = Vec::new();
                for y in 0..*height {
                    for x in 0..*width {
                        let id = y * width + x;
                        if x + 1 < *width {
                            links.push((id, id + 1));
                        }
                        if y + 1 < *height {
                            links.push((id, id + width));
                        }
                    }
                }
                links
            }
            TopologySpec::Random {
                nodes,
                connectivity,
                seed,
            } => {
                if !(0.0..=1.0).contains(connectivity) {
                    return Err(ScenarioError::Invalid(format!(
                        "connectivity {} is outside 0.0..=1.0",
                        connectivity
                    )));
                }
                let mut rng = StdRng::seed_from_u64(*seed);
                let mut links = Vec::new();
                for a in 0..*nodes {
                    for b in (a + 1)..*nodes {
                        if rng.gen_bool(*connectivity) {
                            links.push((a, b));
                        }
                    }
                }
                links
            }
        };
        Ok(links)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publish {
    pub time: SimTime,
    pub node: NodeId,
    pub proxy: NodeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscribe {
    pub time: SimTime,
    pub node: NodeId,
    pub host: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub meta: ScenarioMeta,

    #[serde(default)]
    pub config: SimConfig,

    /// Events later than this are never triggered
    pub duration: SimTime,

    pub topology: TopologySpec,

    #[serde(default)]
    pub publishes: Vec<Publish>,

    #[serde(default)]
    pub subscribes: Vec<Subscribe>,
}

impl Scenario {
    pub fn from_yaml(text: &str) -> Result<Self, ScenarioError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Load a scenario file; `.yaml`/`.yml` is YAML, anything else the text
    /// format
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&text),
            _ => Self::parse_text(&text),
        }
    }

    /// Parse the whitespace separated text format
    pub fn parse_text(text: &str) -> Result<Self, ScenarioError> {
        let mut tokens = Tokens::new(text);

        let nodes: NodeId = tokens.next("node count")?;
        let link_count: usize = tokens.next("link count")?;
        let duration: SimTime = tokens.next("duration")?;

        // counts come from the input; a short file must fail cleanly
        let mut links = Vec::with_capacity(link_count.min(MAX_PREALLOCATED));
        for _ in 0..link_count {
            let _link_id: u64 = tokens.next("link id")?;
            let a: NodeId = tokens.next("link endpoint")?;
            let b: NodeId = tokens.next("link endpoint")?;
            links.push((a, b));
        }

        let publishers: usize = tokens.next("publisher count")?;
        let mut publishes = Vec::with_capacity(publishers.min(MAX_PREALLOCATED));
        for _ in 0..publishers {
            publishes.push(Publish {
                time: tokens.next("publish time")?,
                node: tokens.next("publisher id")?,
                proxy: tokens.next("proxy id")?,
            });
        }

        let subscribers: usize = tokens.next("subscriber count")?;
        let mut subscribes = Vec::with_capacity(subscribers.min(MAX_PREALLOCATED));
        for _ in 0..subscribers {
            subscribes.push(Subscribe {
                time: tokens.next("subscribe time")?,
                node: tokens.next("subscriber id")?,
                host: tokens.next("host id")?,
            });
        }

        Ok(Self {
            meta: ScenarioMeta::default(),
            config: SimConfig::default(),
            duration,
            topology: TopologySpec::Links { nodes, links },
            publishes,
            subscribes,
        })
    }

    /// Create the nodes, link them and seed every request; densities are
    /// computed when the simulation first runs
    pub fn build(&self) -> Result<Simulation, ScenarioError> {
        let mut sim = Simulation::new(self.config.clone());
        sim.add_nodes(self.topology.node_count()?)?;
        for (a, b) in self.topology.links()? {
            sim.connect(a, b)?;
        }

        for publish in &self.publishes {
            sim.seed_publish(publish.time, publish.node, publish.proxy)?;
        }
        for subscribe in &self.subscribes {
            sim.seed_query(subscribe.time, subscribe.node, subscribe.host)?;
        }
        log::debug!(
            "scenario built: {} nodes, {} publishes, {} subscribes",
            sim.node_count(),
            self.publishes.len(),
            self.subscribes.len()
        );
        Ok(sim)
    }

    /// Build, run until `duration` and tear down
    pub fn run(&self, sink: Box<dyn ObservationSink>) -> Result<RunSummary, ScenarioError> {
        let mut sim = self.build()?.with_sink(sink);
        sim.run(self.duration)?;
        Ok(sim.teardown())
    }
}

/// Whitespace tokens with their 1-based line numbers
struct Tokens<'a> {
    inner: Box<dyn Iterator<Item = (usize, &'a str)> + 'a>,
    last_line: usize,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str) -> Self {
        let inner = text
            .lines()
            .enumerate()
            .flat_map(|(i, line)| line.split_whitespace().map(move |t| (i + 1, t)));
        Self {
            inner: Box::new(inner),
            last_line: 1,
        }
    }

    fn next<T: FromStr>(&mut self, what: &str) -> Result<T, ScenarioError> {
        let Some((line, token)) = self.inner.next() else {
            return Err(ScenarioError::Parse {
                line: self.last_line,
                msg: format!("unexpected end of input, expected {}", what),
            });
        };
        self.last_line = line;
        token.parse().map_err(|_| ScenarioError::Parse {
            line,
            msg: format!("expected {}, found {:?}", what, token),
        })
    }
}
