use crate::{anchor, common::*, size::GridSize};

/// Assigns every box to one grid cell and anchor slot.
///
/// Each box writes its absolute corners, objectness 1 and class id to the
/// slot at `(floor(cy * grid_h), floor(cx * grid_w), best_anchor)`. Slots
/// no box maps to stay all-zero. When several boxes of one image map to
/// the same slot, the last box in order wins; the number of overwritten
/// boxes is reported through the `log` facade.
///
/// - boxes: `(batch_size, num_boxes, (x_min, y_min, x_max, y_max, class))`
/// - anchors: `(num_anchors, (w, h))`
///
/// Returns a `(batch_size, grid_h, grid_w, num_anchors, (x_min, y_min,
/// x_max, y_max, objectness, class))` tensor.
pub fn f_assign_to_grid(
    boxes: &Tensor,
    anchors: &Tensor,
    grid_size: &GridSize<i64>,
) -> Result<Tensor> {
    tch::no_grad(|| -> Result<_> {
        let (batch_size, num_boxes, num_entries) = boxes.size3()?;
        ensure!(
            num_entries == 5,
            "expect 5 entries per box, but get {}",
            num_entries
        );
        let (num_anchors, _num_params) = anchors.size2()?;
        let (grid_h, grid_w) = (grid_size.h, grid_size.w);
        ensure!(
            grid_h > 0 && grid_w > 0,
            "the grid size must be positive, but get {}x{}",
            grid_h,
            grid_w
        );

        let best_anchor_indexes = anchor::f_match_best_anchor(boxes, anchors)?;
        let best_anchor_indexes: Vec<i64> = Vec::from(&best_anchor_indexes.reshape(&[-1]));
        let box_entries: Vec<f32> = Vec::from(&boxes.to_kind(Kind::Float).reshape(&[-1]));

        let num_slot_entries = 6;
        let mut grided =
            vec![0f32; (batch_size * grid_h * grid_w * num_anchors * num_slot_entries) as usize];
        let mut num_collisions = 0;

        izip!(box_entries.chunks(num_entries as usize), &best_anchor_indexes)
            .enumerate()
            .try_for_each(|(index, (entries, &anchor_index))| -> Result<_> {
                let batch_index = index as i64 / num_boxes;
                let (min_x, min_y, max_x, max_y, class) =
                    (entries[0], entries[1], entries[2], entries[3], entries[4]);

                let center_x = (min_x + max_x) / 2.0;
                let center_y = (min_y + max_y) / 2.0;
                let grid_col = (center_x * grid_w as f32).floor() as i64;
                let grid_row = (center_y * grid_h as f32).floor() as i64;
                ensure!(
                    (0..grid_w).contains(&grid_col) && (0..grid_h).contains(&grid_row),
                    "the box center ({}, {}) falls outside of the {}x{} grid",
                    center_x,
                    center_y,
                    grid_h,
                    grid_w
                );

                let slot = ((((batch_index * grid_h + grid_row) * grid_w + grid_col) * num_anchors
                    + anchor_index)
                    * num_slot_entries) as usize;
                if grided[slot + 4] != 0.0 {
                    num_collisions += 1;
                }
                grided[slot..(slot + 6)]
                    .copy_from_slice(&[min_x, min_y, max_x, max_y, 1.0, class]);
                Ok(())
            })?;

        if num_collisions > 0 {
            warn!(
                "{} box(es) were overwritten by later boxes sharing the same grid cell and anchor",
                num_collisions
            );
        }

        let grided = Tensor::of_slice(&grided)
            .view([batch_size, grid_h, grid_w, num_anchors, num_slot_entries])
            .to_device(boxes.device());
        Ok(grided)
    })
}

pub fn assign_to_grid(boxes: &Tensor, anchors: &Tensor, grid_size: &GridSize<i64>) -> Tensor {
    f_assign_to_grid(boxes, anchors, grid_size).unwrap()
}
