use bitcoin::Block;
use idx_db::{Entity, TableRow};
use idx_primitives::{Height, StreamKind};

use crate::rows::BlockRow;

use super::BlockProjector;

/// One row per block: header fields plus the ordered list of contained txids.
#[derive(Default)]
pub struct BlocksProjector;

impl BlockProjector for BlocksProjector {
    fn stream_kind(&self) -> StreamKind {
        StreamKind::Blocks
    }

    fn project(&self, height: Height, block: &Block) -> Vec<(&'static str, TableRow)> {
        vec![("blocks", BlockRow::from_block(height, block).to_row())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idx_node::test_support::test_block;

    #[test]
    fn projects_exactly_one_row_per_block() {
        let projector = BlocksProjector;
        let rows = projector.project(7, &test_block());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, "blocks");
    }

    #[test]
    fn reprojecting_the_same_block_yields_the_same_row() {
        let projector = BlocksProjector;
        let block = test_block();
        let first = projector.project(7, &block);
        let second = projector.project(7, &block);
        assert_eq!(first[0].1, second[0].1);
    }
}
