use serde::{Deserialize, Serialize};

use super::error::{BatchArray, BucketError};
use super::types::{ContentHash, ContentType, ElementId, HashTriple};

/// Largest array length of a batch is its workload; it is checked against the
/// ceiling before the arrays are compared with each other.
fn check_shape(lengths: &[(BatchArray, usize)], ceiling: usize) -> Result<usize, BucketError> {
    let workload = lengths.iter().map(|(_, len)| *len).max().unwrap_or(0);
    if workload > ceiling {
        return Err(BucketError::WorkloadExceeded {
            requested: workload,
            ceiling,
        });
    }

    let Some((_, expected)) = lengths.first() else {
        return Ok(0);
    };
    for (array, len) in lengths.iter().skip(1) {
        if len != expected {
            return Err(BucketError::LengthMismatch(*array));
        }
    }
    Ok(*expected)
}

/// Input to [`Bucket::create_elements`](super::Bucket::create_elements)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBatch {
    pub metas: Vec<ContentHash>,
    pub datas: Vec<ContentHash>,
    pub containers: Vec<ContentHash>,
    pub parents: Vec<Option<ElementId>>,
    #[serde(default)]
    pub content_type: ContentType,
}

impl CreateBatch {
    pub fn new(content_type: ContentType) -> Self {
        Self {
            content_type,
            ..Default::default()
        }
    }

    pub fn single(triple: HashTriple, parent: Option<ElementId>, content_type: ContentType) -> Self {
        Self::new(content_type).push(triple, parent)
    }

    pub fn push(mut self, triple: HashTriple, parent: Option<ElementId>) -> Self {
        self.metas.push(triple.meta);
        self.datas.push(triple.data);
        self.containers.push(triple.container);
        self.parents.push(parent);
        self
    }

    pub(crate) fn shape(&self, ceiling: usize) -> Result<usize, BucketError> {
        check_shape(
            &[
                (BatchArray::Metas, self.metas.len()),
                (BatchArray::Datas, self.datas.len()),
                (BatchArray::Containers, self.containers.len()),
                (BatchArray::Parents, self.parents.len()),
            ],
            ceiling,
        )
    }

    pub(crate) fn triple(&self, i: usize) -> HashTriple {
        HashTriple {
            meta: self.metas[i].clone(),
            data: self.datas[i].clone(),
            container: self.containers[i].clone(),
        }
    }
}

/// Input to [`Bucket::update_elements`](super::Bucket::update_elements).
///
/// `parents[i]` is the parent of the container being replaced; `None` asserts
/// that it is currently a root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateBatch {
    pub prev_metas: Vec<ContentHash>,
    pub new_metas: Vec<ContentHash>,
    pub prev_datas: Vec<ContentHash>,
    pub new_datas: Vec<ContentHash>,
    pub prev_containers: Vec<ContentHash>,
    pub new_containers: Vec<ContentHash>,
    pub parents: Vec<Option<ElementId>>,
    #[serde(default)]
    pub content_type: ContentType,
}

impl UpdateBatch {
    pub fn new(content_type: ContentType) -> Self {
        Self {
            content_type,
            ..Default::default()
        }
    }

    pub fn single(
        prev: HashTriple,
        new: HashTriple,
        parent: Option<ElementId>,
        content_type: ContentType,
    ) -> Self {
        Self::new(content_type).push(prev, new, parent)
    }

    pub fn push(mut self, prev: HashTriple, new: HashTriple, parent: Option<ElementId>) -> Self {
        self.prev_metas.push(prev.meta);
        self.new_metas.push(new.meta);
        self.prev_datas.push(prev.data);
        self.new_datas.push(new.data);
        self.prev_containers.push(prev.container);
        self.new_containers.push(new.container);
        self.parents.push(parent);
        self
    }

    pub(crate) fn shape(&self, ceiling: usize) -> Result<usize, BucketError> {
        check_shape(
            &[
                (BatchArray::PrevMetas, self.prev_metas.len()),
                (BatchArray::NewMetas, self.new_metas.len()),
                (BatchArray::PrevDatas, self.prev_datas.len()),
                (BatchArray::NewDatas, self.new_datas.len()),
                (BatchArray::PrevContainers, self.prev_containers.len()),
                (BatchArray::NewContainers, self.new_containers.len()),
                (BatchArray::Parents, self.parents.len()),
            ],
            ceiling,
        )
    }

    pub(crate) fn prev(&self, i: usize) -> HashTriple {
        HashTriple {
            meta: self.prev_metas[i].clone(),
            data: self.prev_datas[i].clone(),
            container: self.prev_containers[i].clone(),
        }
    }

    pub(crate) fn new_triple(&self, i: usize) -> HashTriple {
        HashTriple {
            meta: self.new_metas[i].clone(),
            data: self.new_datas[i].clone(),
            container: self.new_containers[i].clone(),
        }
    }
}

/// Input to [`Bucket::remove_elements`](super::Bucket::remove_elements)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveBatch {
    pub metas: Vec<ContentHash>,
    pub datas: Vec<ContentHash>,
    pub containers: Vec<ContentHash>,
}

impl RemoveBatch {
    pub fn single(triple: HashTriple) -> Self {
        Self::default().push(triple)
    }

    pub fn push(mut self, triple: HashTriple) -> Self {
        self.metas.push(triple.meta);
        self.datas.push(triple.data);
        self.containers.push(triple.container);
        self
    }

    pub(crate) fn shape(&self, ceiling: usize) -> Result<usize, BucketError> {
        check_shape(
            &[
                (BatchArray::Metas, self.metas.len()),
                (BatchArray::Datas, self.datas.len()),
                (BatchArray::Containers, self.containers.len()),
            ],
            ceiling,
        )
    }

    pub(crate) fn triple(&self, i: usize) -> HashTriple {
        HashTriple {
            meta: self.metas[i].clone(),
            data: self.datas[i].clone(),
            container: self.containers[i].clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triple(n: usize) -> HashTriple {
        HashTriple::new(format!("m{n}"), format!("d{n}"), format!("c{n}"))
    }

    #[test]
    fn test_workload_checked_before_lengths() {
        let mut batch = CreateBatch::new(ContentType(0));
        for i in 0..61 {
            batch = batch.push(triple(i), None);
        }
        batch.parents.pop();

        let err = batch.shape(60).unwrap_err();
        assert!(matches!(
            err,
            BucketError::WorkloadExceeded {
                requested: 61,
                ceiling: 60
            }
        ));
    }

    #[test]
    fn test_length_mismatch_names_array() {
        let mut batch = UpdateBatch::single(triple(1), triple(2), None, ContentType(0));
        batch.new_datas.push(ContentHash::new("extra"));
        let err = batch.shape(60).unwrap_err();
        assert!(matches!(err, BucketError::LengthMismatch(BatchArray::NewDatas)));
        assert_eq!(err.to_string(), "invalid new datas length");

        let mut batch = RemoveBatch::single(triple(1));
        batch.containers.clear();
        let err = batch.shape(60).unwrap_err();
        assert!(matches!(err, BucketError::LengthMismatch(BatchArray::Containers)));
    }

    #[test]
    fn test_empty_batch_has_no_workload() {
        assert_eq!(CreateBatch::default().shape(60).unwrap(), 0);
    }
}
