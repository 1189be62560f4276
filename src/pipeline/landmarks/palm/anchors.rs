//! SSD anchor layout of the 192x192 palm detection network.

use super::super::common::PALM_INPUT_SIZE;

/// One output layer: feature map stride and anchors per cell.
struct Layer {
    stride: u32,
    anchors_per_cell: u32,
}

// Strides 8, 16, 16, 16 with two anchors each; the three stride-16 layers share
// one feature map.
const LAYERS: &[Layer] = &[
    Layer {
        stride: 8,
        anchors_per_cell: 2,
    },
    Layer {
        stride: 16,
        anchors_per_cell: 6,
    },
];

pub const NUM_ANCHORS: usize = 2016;

/// Anchor centers as `[x, y]` in `0.0..1.0` input coordinates, in the order the
/// network emits its regressors.
pub fn generate() -> Vec<[f32; 2]> {
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);
    for layer in LAYERS {
        let cells = PALM_INPUT_SIZE.div_ceil(layer.stride);
        for y in 0..cells {
            for x in 0..cells {
                let center = [
                    (x as f32 + 0.5) / cells as f32,
                    (y as f32 + 0.5) / cells as f32,
                ];
                for _ in 0..layer.anchors_per_cell {
                    anchors.push(center);
                }
            }
        }
    }
    anchors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchor_count_matches_network_output() {
        let anchors = generate();
        assert_eq!(anchors.len(), NUM_ANCHORS);
        assert_eq!(anchors[0], [0.5 / 24.0, 0.5 / 24.0]);
        assert_eq!(anchors[1], anchors[0]);
        // First anchor of the stride-16 map.
        assert_eq!(anchors[24 * 24 * 2], [0.5 / 12.0, 0.5 / 12.0]);
        assert!(anchors.iter().all(|a| a.iter().all(|v| (0.0..1.0).contains(v))));
    }
}
