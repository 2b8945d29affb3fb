//! # Node Graph Data Model
//!
//! The read-only description of a visual dataflow program that the AST
//! parser consumes: an ordered list of nodes, each with an ordered list of
//! pins, plus the links connecting pins across nodes.
//!
//! The parser never mutates a graph. Editing, persistence and undo live in
//! the surrounding application; this module only models the structure the
//! compiler front-end needs, along with the construction helpers tests use
//! to assemble graphs programmatically.

use serde::{Deserialize, Serialize};

/// Pin type name used by reroute pins that adopt the type of whatever they
/// are connected to.
pub const WILDCARD_TYPE: &str = "wildcard";

/// Identifies a node by its position in [`GraphDescription::nodes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// Identifies a pin by owning node and position in the node's pin list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PinId {
    pub node: NodeId,
    pub pin: usize,
}

/// Identifies a link by its position in [`GraphDescription::links`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkId(pub usize);

/// Which way data (or execution) flows through a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PinDirection {
    Input,
    Output,
    /// Both read and written by the node (e.g. execution context pins).
    IO,
    /// Shown to the user but never linked from another node.
    Visible,
    /// Internal bookkeeping pin, not shown and not linkable.
    Hidden,
}

impl PinDirection {
    pub fn is_input(self) -> bool {
        matches!(self, PinDirection::Input | PinDirection::IO)
    }

    pub fn is_output(self) -> bool {
        matches!(self, PinDirection::Output | PinDirection::IO)
    }
}

/// What a node does, as far as the compiler front-end is concerned.
///
/// `Function` covers every node backed by a native operation; the remaining
/// kinds are the control/data-flow node shapes the parser treats specially.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Invocation of an external/native operation.
    Function,
    /// Transparent pass-through with a single wildcard value pin.
    Reroute,
    /// Graph parameter; `input` parameters feed values into the graph.
    Parameter { input: bool },
    /// Graph variable access; getters read, setters write.
    Variable { getter: bool },
    /// Two-way execution branch on a boolean condition.
    Branch,
    /// Value-level if: picks one of two values, no execution pins.
    If,
    /// Value-level select: picks one of N values by index.
    Select,
}

/// A pin on a node. Sub-pins (struct fields exposed as their own pins) point
/// at their parent pin via `parent`; `parent == None` marks a root pin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pin {
    pub name: String,
    pub direction: PinDirection,
    /// C++ type name of the value carried by this pin.
    pub cpp_type: String,
    /// Struct type identity when `cpp_type` names a struct.
    #[serde(default)]
    pub struct_type: Option<String>,
    /// Serialized default value, used when the pin has no incoming link.
    #[serde(default)]
    pub default_value: String,
    /// True for pins carrying the execution context rather than data.
    #[serde(default)]
    pub execute_context: bool,
    /// True for pins whose value is defined to be constant.
    #[serde(default)]
    pub constant: bool,
    /// Index of the parent pin within the same node, for sub-pins.
    #[serde(default)]
    pub parent: Option<usize>,
}

/// A node instance in the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    /// Event name when this node is an execution entry point.
    #[serde(default)]
    pub event: Option<String>,
    /// True for nodes with control-flow / side effects.
    #[serde(default)]
    pub mutable: bool,
    pub pins: Vec<Pin>,
}

impl Node {
    pub fn new(name: &str, kind: NodeKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            event: None,
            mutable: false,
            pins: Vec::new(),
        }
    }

    /// Create an execution entry point ("event") node.
    pub fn event(name: &str, event_name: &str) -> Self {
        let mut node = Self::new(name, NodeKind::Function);
        node.event = Some(event_name.to_string());
        node.mutable = true;
        node
    }

    pub fn is_event(&self) -> bool {
        self.event.is_some()
    }

    /// Append a pin and return its index within this node.
    pub fn add_pin(&mut self, name: &str, direction: PinDirection, cpp_type: &str) -> usize {
        self.pins.push(Pin {
            name: name.to_string(),
            direction,
            cpp_type: cpp_type.to_string(),
            struct_type: None,
            default_value: String::new(),
            execute_context: false,
            constant: false,
            parent: None,
        });
        self.pins.len() - 1
    }

    /// Append an execution-context pin and return its index.
    pub fn add_exec_pin(&mut self, name: &str, direction: PinDirection) -> usize {
        let index = self.add_pin(name, direction, "ExecuteContext");
        self.pins[index].execute_context = true;
        index
    }

    /// Append a sub-pin (struct field) under `parent` and return its index.
    pub fn add_sub_pin(&mut self, parent: usize, name: &str, cpp_type: &str) -> usize {
        let direction = self.pins[parent].direction;
        let index = self.add_pin(name, direction, cpp_type);
        self.pins[index].parent = Some(parent);
        index
    }

    pub fn pin_mut(&mut self, index: usize) -> &mut Pin {
        &mut self.pins[index]
    }

    /// Indices of this node's root pins, in declaration order.
    pub fn root_pins(&self) -> impl Iterator<Item = usize> + '_ {
        self.pins
            .iter()
            .enumerate()
            .filter(|(_, pin)| pin.parent.is_none())
            .map(|(index, _)| index)
    }
}

/// A directed connection from an output pin to an input pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub source: PinId,
    pub target: PinId,
}

/// The complete graph: ordered nodes plus the links between their pins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDescription {
    pub name: String,
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
}

impl GraphDescription {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            nodes: Vec::new(),
            links: Vec::new(),
        }
    }

    pub fn add_node(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub fn add_link(&mut self, source: PinId, target: PinId) -> LinkId {
        self.links.push(Link { source, target });
        LinkId(self.links.len() - 1)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (NodeId(index), node))
    }

    pub fn links(&self) -> impl Iterator<Item = (LinkId, &Link)> {
        self.links
            .iter()
            .enumerate()
            .map(|(index, link)| (LinkId(index), link))
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn pin(&self, id: PinId) -> &Pin {
        &self.nodes[id.node.0].pins[id.pin]
    }

    pub fn get_pin(&self, id: PinId) -> Option<&Pin> {
        self.nodes.get(id.node.0).and_then(|node| node.pins.get(id.pin))
    }

    pub fn link(&self, id: LinkId) -> &Link {
        &self.links[id.0]
    }

    /// Look up a pin by name on a node. Test and tooling convenience.
    pub fn find_pin(&self, node: NodeId, name: &str) -> Option<PinId> {
        self.node(node)
            .pins
            .iter()
            .position(|pin| pin.name == name)
            .map(|pin| PinId { node, pin })
    }

    /// The outermost pin a sub-pin belongs to; identity for root pins.
    pub fn root_pin(&self, id: PinId) -> PinId {
        let mut current = id;
        while let Some(parent) = self.pin(current).parent {
            current = PinId {
                node: current.node,
                pin: parent,
            };
        }
        current
    }

    /// True when `id` is `ancestor` or one of its sub-pins (any depth).
    pub fn pin_is_under(&self, id: PinId, ancestor: PinId) -> bool {
        if id.node != ancestor.node {
            return false;
        }
        let mut current = id;
        loop {
            if current == ancestor {
                return true;
            }
            match self.pin(current).parent {
                Some(parent) => {
                    current = PinId {
                        node: current.node,
                        pin: parent,
                    }
                }
                None => return false,
            }
        }
    }

    /// Dotted path of a pin, e.g. `"Add.Vector.X"`.
    pub fn pin_path(&self, id: PinId) -> String {
        let mut segments = vec![self.pin(id).name.clone()];
        let mut current = id;
        while let Some(parent) = self.pin(current).parent {
            current = PinId {
                node: current.node,
                pin: parent,
            };
            segments.push(self.pin(current).name.clone());
        }
        segments.push(self.node(id.node).name.clone());
        segments.reverse();
        segments.join(".")
    }

    /// Diagnostic representation of a link, e.g. `"A.Out -> B.In"`.
    pub fn link_path(&self, id: LinkId) -> String {
        let link = self.link(id);
        format!(
            "{} -> {}",
            self.pin_path(link.source),
            self.pin_path(link.target)
        )
    }

    /// Links flowing into `pin`. With `include_sub_pins`, links targeting any
    /// sub-pin of `pin` are included as well.
    pub fn source_links(&self, pin: PinId, include_sub_pins: bool) -> Vec<LinkId> {
        self.links()
            .filter(|(_, link)| {
                link.target == pin || (include_sub_pins && self.pin_is_under(link.target, pin))
            })
            .map(|(id, _)| id)
            .collect()
    }

    /// Target pins of all links flowing out of `pin`.
    pub fn linked_target_pins(&self, pin: PinId) -> Vec<PinId> {
        self.links()
            .filter(|(_, link)| link.source == pin)
            .map(|(_, link)| link.target)
            .collect()
    }

    /// True when a link from `source` to `target` already exists.
    pub fn has_link(&self, source: PinId, target: PinId) -> bool {
        self.links
            .iter()
            .any(|link| link.source == source && link.target == target)
    }
}
