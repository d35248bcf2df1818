//! ComfyUI workflow graph and per-attempt preparation.
//!
//! A workflow is the API-format JSON ComfyUI accepts on `/prompt`: an
//! object mapping node IDs to `{"class_type": ..., "inputs": {...}}`.
//! [`Workflow`] keeps the raw JSON (including keys it does not know
//! about, such as `_meta`) so the engine receives exactly what the job
//! submitted, apart from the changes [`prepare`] makes.

use rand::Rng;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::JobError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Node input names that carry a sampler seed.
pub const SEED_INPUTS: &[&str] = &["seed", "noise_seed"];

/// Extra input injected into output nodes to defeat the engine's cache.
pub const RERUN_NONCE_INPUT: &str = "rerun_nonce";

/// Class type prefixes of nodes that write files (`SaveImage`,
/// `PreviewImage`, `SaveAnimatedWEBP`, ...).
const OUTPUT_CLASS_PREFIXES: &[&str] = &["Save", "Preview"];

/// Default upper bound for randomized seeds. Core samplers accept any
/// `u64`, but many custom nodes declare `max = 0xffffffff` for `seed`.
pub const DEFAULT_MAX_SEED: u64 = u32::MAX as u64;

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

/// A validated ComfyUI workflow.
///
/// Every node is guaranteed to be an object with a non-empty string
/// `class_type` and an object `inputs`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Workflow(Map<String, Value>);

/// Borrowed view of one node.
#[derive(Debug, Clone, Copy)]
pub struct WorkflowNode<'a> {
    pub id: &'a str,
    pub class_type: &'a str,
    pub inputs: &'a Map<String, Value>,
}

/// An input wired to another node's output: `"model": ["4", 0]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLink<'a> {
    pub input: &'a str,
    pub from_node: String,
    pub from_output: String,
}

/// Which transformations [`prepare`] applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepareOptions {
    /// Replace literal seed inputs with fresh random values.
    pub randomize_seeds: bool,
    /// Inclusive upper bound for randomized seeds.
    pub max_seed: u64,
    /// Give output nodes a fresh nonce so they are re-evaluated.
    pub force_rerun: bool,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self {
            randomize_seeds: true,
            max_seed: DEFAULT_MAX_SEED,
            force_rerun: true,
        }
    }
}

/// What [`prepare`] changed, for logging.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PrepareReport {
    pub seeds_randomized: usize,
    pub nodes_marked_for_rerun: usize,
}

impl Workflow {
    /// Validate a raw JSON value as a workflow.
    ///
    /// The expected format is an object where each key is a node ID and
    /// each value has a `class_type` and an `inputs` object:
    ///
    /// ```json
    /// {
    ///   "3": {
    ///     "class_type": "KSampler",
    ///     "inputs": { "seed": 42, "model": ["4", 0] }
    ///   }
    /// }
    /// ```
    ///
    /// A node without `inputs` gets an empty `inputs` object.
    pub fn from_value(value: Value) -> Result<Self, JobError> {
        let Value::Object(mut nodes) = value else {
            return Err(JobError::Malformed(
                "'workflow' must be a JSON object".into(),
            ));
        };

        if nodes.is_empty() {
            return Err(JobError::Malformed(
                "'workflow' must contain at least one node".into(),
            ));
        }

        for (id, node) in nodes.iter_mut() {
            let obj = node.as_object_mut().ok_or_else(|| {
                JobError::Malformed(format!("Node '{id}' must be a JSON object"))
            })?;

            match obj.get("class_type") {
                Some(Value::String(s)) if !s.trim().is_empty() => {}
                _ => {
                    return Err(JobError::Malformed(format!(
                        "Node '{id}' is missing required 'class_type' field"
                    )))
                }
            }

            match obj.get("inputs") {
                None => {
                    obj.insert("inputs".into(), Value::Object(Map::new()));
                }
                Some(Value::Object(_)) => {}
                Some(_) => {
                    return Err(JobError::Malformed(format!(
                        "Node '{id}' has non-object 'inputs'"
                    )))
                }
            }
        }

        Ok(Self(nodes))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate nodes in document order.
    pub fn nodes(&self) -> impl Iterator<Item = WorkflowNode<'_>> {
        self.0.iter().filter_map(|(id, node)| {
            let obj = node.as_object()?;
            Some(WorkflowNode {
                id,
                class_type: obj.get("class_type")?.as_str()?,
                inputs: obj.get("inputs")?.as_object()?,
            })
        })
    }

    /// The prompt JSON to submit to the engine.
    /// Links whose source node is not part of this workflow, paired with
    /// the id of the node holding them. ComfyUI rejects such prompts.
    pub fn dangling_links(&self) -> Vec<(&str, NodeLink<'_>)> {
        self.nodes()
            .flat_map(|node| node.links().map(move |link| (node.id, link)))
            .filter(|(_, link)| !self.0.contains_key(&link.from_node))
            .collect()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Mutable access to every node's `inputs` object, with its class type.
    fn inputs_mut(&mut self) -> impl Iterator<Item = (String, &mut Map<String, Value>)> {
        self.0.values_mut().filter_map(|node| {
            let obj = node.as_object_mut()?;
            let class_type = obj.get("class_type")?.as_str()?.to_string();
            let inputs = obj.get_mut("inputs")?.as_object_mut()?;
            Some((class_type, inputs))
        })
    }
}

impl<'a> WorkflowNode<'a> {
    /// Whether this node writes an artifact the worker should collect.
    pub fn is_output(&self) -> bool {
        is_output_class(self.class_type)
    }

    /// Inputs connected to other nodes.
    pub fn links(self) -> impl Iterator<Item = NodeLink<'a>> + 'a {
        self.inputs.iter().filter_map(|(input, value)| {
            let (from_node, from_output) = as_link(value)?;
            Some(NodeLink {
                input,
                from_node,
                from_output,
            })
        })
    }
}

/// ComfyUI encodes a connection as `[source_node_id, output_index]`; both
/// parts may be strings or non-negative integers.
fn as_link(value: &Value) -> Option<(String, String)> {
    let [node, output] = value.as_array()?.as_slice() else {
        return None;
    };
    Some((link_part(node)?, link_part(output)?))
}

fn link_part(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}

fn is_output_class(class_type: &str) -> bool {
    OUTPUT_CLASS_PREFIXES
        .iter()
        .any(|prefix| class_type.starts_with(prefix))
}

// ---------------------------------------------------------------------------
// Preparation
// ---------------------------------------------------------------------------

/// Apply the per-attempt transformations to `workflow` in place.
///
/// Only literal non-negative integer seeds are replaced, with a value in
/// `0..=options.max_seed`; a seed linked to another node (`["3", 0]`) is
/// left alone. Pure: touches nothing but the in-memory graph.
pub fn prepare<R: Rng>(
    workflow: &mut Workflow,
    options: &PrepareOptions,
    rng: &mut R,
) -> PrepareReport {
    let mut report = PrepareReport::default();

    for (class_type, inputs) in workflow.inputs_mut() {
        if options.randomize_seeds {
            for key in SEED_INPUTS {
                if let Some(value) = inputs.get_mut(*key) {
                    if value.is_u64() {
                        *value = Value::from(rng.random_range(0..=options.max_seed));
                        report.seeds_randomized += 1;
                    }
                }
            }
        }

        if options.force_rerun && is_output_class(&class_type) {
            let nonce = format!("{:016x}", rng.random::<u64>());
            inputs.insert(RERUN_NONCE_INPUT.into(), Value::String(nonce));
            report.nodes_marked_for_rerun += 1;
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn sample() -> Workflow {
        Workflow::from_value(json!({
            "3": {
                "class_type": "KSampler",
                "inputs": {"seed": 42, "steps": 20, "model": ["4", 0]}
            },
            "4": {"class_type": "CheckpointLoaderSimple", "inputs": {"ckpt_name": "sd.safetensors"}},
            "5": {"class_type": "KSamplerAdvanced", "inputs": {"noise_seed": ["10", 0]}},
            "9": {"class_type": "SaveImage", "inputs": {"filename_prefix": "out"}, "_meta": {"title": "Save"}}
        }))
        .unwrap()
    }

    #[test]
    fn rejects_non_object() {
        assert_matches!(Workflow::from_value(json!([1, 2])), Err(JobError::Malformed(_)));
    }

    #[test]
    fn rejects_empty_workflow() {
        assert_matches!(
            Workflow::from_value(json!({})),
            Err(JobError::Malformed(msg)) if msg.contains("at least one node")
        );
    }

    #[test]
    fn rejects_node_without_class_type() {
        let result = Workflow::from_value(json!({"1": {"inputs": {}}}));
        assert_matches!(result, Err(JobError::Malformed(msg)) if msg.contains("'1'"));
    }

    #[test]
    fn rejects_non_object_inputs() {
        let result = Workflow::from_value(json!({"1": {"class_type": "Save", "inputs": 3}}));
        assert_matches!(result, Err(JobError::Malformed(_)));
    }

    #[test]
    fn missing_inputs_default_to_empty() {
        let wf = Workflow::from_value(json!({"1": {"class_type": "Save"}})).unwrap();
        assert!(wf.nodes().next().unwrap().inputs.is_empty());
    }

    #[test]
    fn preserves_document_order_and_unknown_keys() {
        let wf = sample();
        let ids: Vec<_> = wf.nodes().map(|n| n.id).collect();
        assert_eq!(ids, vec!["3", "4", "5", "9"]);
        assert_eq!(wf.to_value()["9"]["_meta"]["title"], "Save");
    }

    #[test]
    fn output_nodes_detected_by_class_prefix() {
        let wf = sample();
        let outputs: Vec<_> = wf.nodes().filter(|n| n.is_output()).map(|n| n.id).collect();
        assert_eq!(outputs, vec!["9"]);
    }

    #[test]
    fn prepare_replaces_literal_seeds_only() {
        let mut wf = sample();
        let mut rng = StdRng::seed_from_u64(7);
        let options = PrepareOptions {
            randomize_seeds: true,
            force_rerun: false,
            ..Default::default()
        };

        let report = prepare(&mut wf, &options, &mut rng);

        assert_eq!(report.seeds_randomized, 1);
        assert_eq!(report.nodes_marked_for_rerun, 0);
        let value = wf.to_value();
        assert!(value["3"]["inputs"]["seed"].is_u64());
        assert_ne!(value["3"]["inputs"]["seed"], json!(42));
        assert_eq!(value["5"]["inputs"]["noise_seed"], json!(["10", 0]));
        assert_eq!(value["3"]["inputs"]["steps"], json!(20));
    }

    #[test]
    fn prepare_marks_output_nodes_for_rerun() {
        let mut wf = sample();
        let mut rng = StdRng::seed_from_u64(7);
        let options = PrepareOptions {
            randomize_seeds: false,
            force_rerun: true,
            ..Default::default()
        };

        let report = prepare(&mut wf, &options, &mut rng);

        assert_eq!(report.nodes_marked_for_rerun, 1);
        let value = wf.to_value();
        assert!(value["9"]["inputs"][RERUN_NONCE_INPUT].is_string());
        assert!(value["3"]["inputs"].get(RERUN_NONCE_INPUT).is_none());
        assert_eq!(value["3"]["inputs"]["seed"], json!(42));
    }

    #[test]
    fn prepare_with_everything_disabled_is_identity() {
        let mut wf = sample();
        let before = wf.clone();
        let options = PrepareOptions {
            randomize_seeds: false,
            force_rerun: false,
            ..Default::default()
        };

        let report = prepare(&mut wf, &options, &mut StdRng::seed_from_u64(1));

        assert_eq!(report, PrepareReport::default());
        assert_eq!(wf, before);
    }

    #[test]
    fn successive_preparations_differ() {
        let mut rng = StdRng::seed_from_u64(99);
        let mut a = sample();
        let mut b = sample();
        prepare(&mut a, &PrepareOptions::default(), &mut rng);
        prepare(&mut b, &PrepareOptions::default(), &mut rng);
        assert_ne!(a, b);
    }

    #[test]
    fn links_accept_string_and_numeric_node_ids() {
        let wf = Workflow::from_value(json!({
            "8": {
                "class_type": "VAEDecode",
                "inputs": {"samples": ["3", 0], "vae": [4, "2"], "flag": ["a", true], "triple": [1, 2, 3]}
            }
        }))
        .unwrap();

        let node = wf.nodes().next().unwrap();
        let mut links: Vec<_> = node.links().collect();
        links.sort_by(|a, b| a.input.cmp(b.input));

        assert_eq!(
            links,
            vec![
                NodeLink { input: "samples", from_node: "3".into(), from_output: "0".into() },
                NodeLink { input: "vae", from_node: "4".into(), from_output: "2".into() },
            ]
        );
    }

    #[test]
    fn randomized_seeds_stay_within_the_bound() {
        let options = PrepareOptions {
            randomize_seeds: true,
            max_seed: 10,
            force_rerun: false,
        };
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..50 {
            let mut wf = sample();
            prepare(&mut wf, &options, &mut rng);
            let seed = wf.to_value()["3"]["inputs"]["seed"].as_u64().unwrap();
            assert!(seed <= 10, "seed {seed} above bound");
        }
    }

    #[test]
    fn dangling_links_name_the_missing_source() {
        let wf = Workflow::from_value(json!({
            "3": {"class_type": "KSampler", "inputs": {"model": ["4", 0], "positive": ["6", 0]}},
            "4": {"class_type": "CheckpointLoaderSimple", "inputs": {}}
        }))
        .unwrap();

        let dangling = wf.dangling_links();
        assert_eq!(dangling.len(), 1);
        assert_eq!(dangling[0].0, "3");
        assert_eq!(dangling[0].1.input, "positive");
        assert_eq!(dangling[0].1.from_node, "6");

        let sample = sample();
        let dangling: Vec<_> = sample
            .dangling_links()
            .into_iter()
            .map(|(node, link)| (node, link.from_node))
            .collect();
        assert_eq!(dangling, vec![("5", "10".to_string())]);
    }
}
