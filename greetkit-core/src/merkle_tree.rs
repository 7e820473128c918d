//! Membership proofs over the published list of identity commitments.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    error::GreetKitError, http_request::Request, poseidon::poseidon2, scalar::Scalar,
};

/// Depth of the membership tree used by the greeting circuit.
pub const DEFAULT_TREE_DEPTH: usize = 20;

/// Largest supported tree depth.
pub const MAX_TREE_DEPTH: usize = 32;

/// A Merkle inclusion proof for one identity commitment.
///
/// `path_indices[i]` is `0` when the node at level `i` is a left child and `1` when it is a right
/// child. `path_elements[i]` is its sibling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::module_name_repetitions)]
pub struct MembershipProof {
    /// Root of the tree the proof was built against.
    pub root: Scalar,
    /// The proven leaf.
    pub leaf: Scalar,
    /// Position of the leaf in the membership list.
    pub leaf_index: usize,
    /// Sibling hashes from the leaf level up to just below the root.
    pub path_elements: Vec<Scalar>,
    /// Direction bits matching `path_elements`.
    pub path_indices: Vec<u8>,
}

impl MembershipProof {
    /// Number of levels covered by the proof.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.path_elements.len()
    }

    /// Recomputes the root from the leaf and the path.
    ///
    /// # Errors
    /// Returns `GreetKitError::InvalidWitnessInput` if the path is inconsistent, or
    /// `GreetKitError::Hashing` if hashing fails.
    pub fn compute_root(&self) -> Result<Scalar, GreetKitError> {
        if self.path_elements.len() != self.path_indices.len() {
            return Err(GreetKitError::InvalidWitnessInput(format!(
                "path has {} elements but {} indices",
                self.path_elements.len(),
                self.path_indices.len()
            )));
        }

        self.path_elements
            .iter()
            .zip(&self.path_indices)
            .try_fold(self.leaf, |node, (sibling, index)| match index {
                0 => poseidon2(node, *sibling),
                1 => poseidon2(*sibling, node),
                other => Err(GreetKitError::InvalidWitnessInput(format!(
                    "path index {other} is not a bit"
                ))),
            })
    }

    /// Whether the path leads from the leaf to the stated root.
    ///
    /// # Errors
    /// See [`MembershipProof::compute_root`].
    pub fn verify(&self) -> Result<bool, GreetKitError> {
        Ok(self.compute_root()? == self.root)
    }
}

/// Builds an inclusion proof for `target` in a tree of `depth` levels over `commitments`.
///
/// Leaves beyond the list are the zero value. If `target` occurs more than once, the first
/// occurrence is proven.
///
/// # Errors
/// - `GreetKitError::InvalidTree` if `depth` is unsupported or the list does not fit.
/// - `GreetKitError::MembershipNotFound` if `target` is not in the list.
pub fn build_proof(
    commitments: &[Scalar],
    target: &Scalar,
    depth: usize,
) -> Result<MembershipProof, GreetKitError> {
    if depth == 0 || depth > MAX_TREE_DEPTH {
        return Err(GreetKitError::InvalidTree(format!(
            "depth {depth} is outside 1..={MAX_TREE_DEPTH}"
        )));
    }
    if (commitments.len() as u128) > (1_u128 << depth) {
        return Err(GreetKitError::InvalidTree(format!(
            "{} leaves do not fit in a tree of depth {depth}",
            commitments.len()
        )));
    }

    let leaf_index = commitments
        .iter()
        .position(|commitment| commitment == target)
        .ok_or(GreetKitError::MembershipNotFound)?;

    let mut path_elements = Vec::with_capacity(depth);
    let mut path_indices = Vec::with_capacity(depth);

    // Only the populated prefix of each level is materialized; everything to its right is the
    // zero subtree of that level.
    let mut zero = Scalar::ZERO;
    let mut level: Vec<Scalar> = commitments.to_vec();
    let mut index = leaf_index;

    for _ in 0..depth {
        let sibling_index = index ^ 1;
        let sibling = level.get(sibling_index).copied().unwrap_or(zero);
        path_elements.push(sibling);
        path_indices.push(u8::from(index & 1 == 1));

        level = level
            .chunks(2)
            .map(|pair| poseidon2(pair[0], pair.get(1).copied().unwrap_or(zero)))
            .collect::<Result<_, _>>()?;
        zero = poseidon2(zero, zero)?;
        index >>= 1;
    }

    let root = level.first().copied().unwrap_or(zero);

    Ok(MembershipProof {
        root,
        leaf: *target,
        leaf_index,
        path_elements,
        path_indices,
    })
}

/// Where the ordered list of registered identity commitments comes from.
#[async_trait]
pub trait MembershipSource: Send + Sync {
    /// Fetches the full, ordered membership list.
    async fn fetch_commitments(&self) -> Result<Vec<Scalar>, GreetKitError>;
}

/// Fetches the membership list as a JSON array of hex or decimal strings.
pub struct HttpMembershipSource {
    url: String,
    request: Request,
}

impl HttpMembershipSource {
    /// Creates a source reading from `url`.
    #[must_use]
    pub fn new(url: impl Into<String>, request: Request) -> Self {
        Self {
            url: url.into(),
            request,
        }
    }
}

#[async_trait]
impl MembershipSource for HttpMembershipSource {
    async fn fetch_commitments(&self) -> Result<Vec<Scalar>, GreetKitError> {
        let response = self.request.handle(self.request.get(&self.url)).await?;
        let status = response.status();

        if !status.is_success() {
            return Err(GreetKitError::NetworkError {
                url: self.url.clone(),
                status: Some(status.as_u16()),
                error: format!("membership list request failed with status {status}"),
            });
        }

        let response_text = response.text().await.map_err(|err| {
            GreetKitError::SerializationError(format!(
                "[HttpMembershipSource] Failed to read response body from {}: {err}",
                self.url
            ))
        })?;

        let raw: Vec<String> = serde_json::from_str(&response_text).map_err(|parse_err| {
            // only the first 20 characters, the list itself is public but may be huge
            let received: String = response_text.chars().take(20).collect();
            GreetKitError::SerializationError(format!(
                "[HttpMembershipSource] Failed to parse response from {}: {parse_err}, \
                 received: {received}",
                self.url
            ))
        })?;

        let commitments = raw
            .iter()
            .map(|value| Scalar::parse_field_element(value))
            .collect::<Result<Vec<_>, _>>()?;

        log::debug!("fetched {} identity commitments", commitments.len());
        Ok(commitments)
    }
}
