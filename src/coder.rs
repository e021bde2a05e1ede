use crate::{common::*, grid, size::GridSize};

/// Common interface of box codecs.
///
/// `encode` turns ground truth boxes into regression targets and `decode`
/// turns (possibly predicted) targets back into absolute box coordinates.
/// The `f_*` forms report failures; the plain forms panic on error.
pub trait BoxCoder {
    fn f_encode(&self, boxes: &Tensor, anchors: &Tensor) -> Result<Tensor>;

    fn f_decode(&self, coded_boxes: &Tensor, anchors: &Tensor) -> Result<Tensor>;

    fn encode(&self, boxes: &Tensor, anchors: &Tensor) -> Tensor {
        self.f_encode(boxes, anchors).unwrap()
    }

    fn decode(&self, coded_boxes: &Tensor, anchors: &Tensor) -> Tensor {
        self.f_decode(coded_boxes, anchors).unwrap()
    }
}

#[derive(Debug, Clone)]
pub struct YoloBoxCoderInit {
    pub grid_size: GridSize<i64>,
    pub device: Device,
}

impl YoloBoxCoderInit {
    pub fn build(self) -> Result<YoloBoxCoder> {
        let Self { grid_size, device } = self;
        let (grid_h, grid_w) = (grid_size.h, grid_size.w);
        ensure!(
            grid_h > 0 && grid_w > 0,
            "the grid size must be positive, but get {}x{}",
            grid_h,
            grid_w
        );

        let (grid_indexes, grid_wh) = tch::no_grad(|| {
            let grids = Tensor::meshgrid(&[
                Tensor::arange(grid_h, (Kind::Float, device)),
                Tensor::arange(grid_w, (Kind::Float, device)),
            ]);
            let grid_indexes = Tensor::stack(&[&grids[1], &grids[0]], 2)
                .view([grid_h, grid_w, 1, 2])
                .set_requires_grad(false);
            let grid_wh = Tensor::of_slice(&[grid_w as f32, grid_h as f32])
                .to_device(device)
                .set_requires_grad(false);
            (grid_indexes, grid_wh)
        });

        Ok(YoloBoxCoder {
            grid_size,
            grid_indexes,
            grid_wh,
        })
    }
}

/// YOLO-style box codec over a fixed resolution grid.
#[derive(Debug, Getters)]
pub struct YoloBoxCoder {
    /// The grid resolution the coder was built for.
    #[get = "pub"]
    grid_size: GridSize<i64>,
    /// Per-cell `(col, row)` lookup table in shape `(grid_h, grid_w, 1, 2)`.
    grid_indexes: Tensor,
    /// `[grid_w, grid_h]` scale tensor.
    grid_wh: Tensor,
}

impl BoxCoder for YoloBoxCoder {
    /// Encodes a box collection with respect to an anchor collection.
    ///
    /// - boxes: `(batch_size, num_boxes, (x_min, y_min, x_max, y_max, class))`
    /// - anchors: `(num_anchors, (w, h))`
    ///
    /// Returns a `(batch_size, grid_h, grid_w, num_anchors, (tx, ty, tw,
    /// th, objectness, class))` tensor. `tx` and `ty` are relative to the
    /// grid cell and `tw`/`th` are log ratios to the matched anchor.
    /// Infinite log ratios from empty slots are replaced with exactly 0.
    fn f_encode(&self, boxes: &Tensor, anchors: &Tensor) -> Result<Tensor> {
        let grided_boxes = grid::f_assign_to_grid(boxes, anchors, &self.grid_size)?;
        let device = grided_boxes.device();
        let grid_indexes = self.grid_indexes.to_device(device);
        let grid_wh = self.grid_wh.to_device(device);

        let min_xy = grided_boxes.i((.., .., .., .., 0..2));
        let max_xy = grided_boxes.i((.., .., .., .., 2..4));
        let remainders = grided_boxes.i((.., .., .., .., 4..6));

        let center_xy = (&min_xy + &max_xy) / 2.0;
        let size_wh = max_xy - min_xy;

        let txy = center_xy * &grid_wh - &grid_indexes;
        let twh = (size_wh / anchors.to_kind(Kind::Float)).log();
        let twh = twh.masked_fill(&twh.isinf(), 0.0);

        Ok(Tensor::cat(&[txy, twh, remainders], -1))
    }

    /// Decodes coded boxes back to absolute corner coordinates.
    ///
    /// - coded_boxes: `(batch_size, grid_h, grid_w, num_anchors, (tx, ty,
    ///   tw, th, objectness, class))`
    /// - anchors: `(num_anchors, (w, h))`
    ///
    /// Returns a tensor of the same shape holding `(x_min, y_min, x_max,
    /// y_max, objectness, class)`. Decoded corners are not clamped to the
    /// `[0, 1]` range.
    fn f_decode(&self, coded_boxes: &Tensor, anchors: &Tensor) -> Result<Tensor> {
        let (_batch_size, grid_h, grid_w, num_anchors, num_slot_entries) = coded_boxes.size5()?;
        ensure!(
            (grid_h, grid_w) == (self.grid_size.h, self.grid_size.w),
            "expect a {}x{} grid, but get {}x{}",
            self.grid_size.h,
            self.grid_size.w,
            grid_h,
            grid_w
        );
        ensure!(
            num_slot_entries == 6,
            "expect 6 entries per slot, but get {}",
            num_slot_entries
        );
        let (expect_num_anchors, _num_params) = anchors.size2()?;
        ensure!(
            num_anchors == expect_num_anchors,
            "expect {} anchors, but get {}",
            expect_num_anchors,
            num_anchors
        );

        let device = coded_boxes.device();
        let grid_indexes = self.grid_indexes.to_device(device);
        let grid_wh = self.grid_wh.to_device(device);

        let txy = coded_boxes.i((.., .., .., .., 0..2));
        let twh = coded_boxes.i((.., .., .., .., 2..4));
        let remainders = coded_boxes.i((.., .., .., .., 4..6));

        let center_xy = (txy + &grid_indexes) / &grid_wh;
        let size_wh = twh.exp() * anchors.to_kind(Kind::Float);

        let min_xy = &center_xy - &size_wh / 2.0;
        let max_xy = &center_xy + &size_wh / 2.0;

        Ok(Tensor::cat(&[min_xy, max_xy, remainders], -1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::size::PixelSize;
    use rand::prelude::*;

    const PIXEL_ANCHORS: [[f32; 2]; 3] = [[128.0, 64.0], [64.0, 32.0], [32.0, 16.0]];
    const PIXEL_BOXES: [[f32; 5]; 3] = [
        [0.0, 0.0, 30.0, 20.0, 1.0],
        [15.0, 12.0, 147.0, 72.0, 2.0],
        [103.0, 143.0, 173.0, 183.0, 3.0],
    ];

    fn build_coder(grid_h: i64, grid_w: i64) -> YoloBoxCoder {
        YoloBoxCoderInit {
            grid_size: GridSize::from_hw(grid_h, grid_w).unwrap(),
            device: Device::Cpu,
        }
        .build()
        .unwrap()
    }

    fn ratio_anchors(image_size: &PixelSize<i64>) -> Tensor {
        let entries: Vec<f32> = PIXEL_ANCHORS
            .iter()
            .flat_map(|&[anchor_w, anchor_h]| {
                vec![
                    anchor_w / image_size.w as f32,
                    anchor_h / image_size.h as f32,
                ]
            })
            .collect();
        Tensor::of_slice(&entries).view([3, 2])
    }

    fn ratio_boxes(pixel_boxes: &[[f32; 5]], image_size: &PixelSize<i64>) -> Tensor {
        let (image_w, image_h) = (image_size.w as f32, image_size.h as f32);
        let entries: Vec<f32> = pixel_boxes
            .iter()
            .flat_map(|&[min_x, min_y, max_x, max_y, class]| {
                vec![
                    min_x / image_w,
                    min_y / image_h,
                    max_x / image_w,
                    max_y / image_h,
                    class,
                ]
            })
            .collect();
        Tensor::of_slice(&entries).view([1, pixel_boxes.len() as i64, 5])
    }

    // Collects every decoded slot with objectness above 0.5 as
    // (x_min, y_min, x_max, y_max, class) rows.
    fn object_slots(decoded: &Tensor) -> Vec<[f32; 5]> {
        let (batch_size, grid_h, grid_w, num_anchors, _num_entries) =
            decoded.size5().unwrap();
        let mut results = vec![];

        for batch_index in 0..batch_size {
            for grid_row in 0..grid_h {
                for grid_col in 0..grid_w {
                    for anchor_index in 0..num_anchors {
                        let entries: Vec<f32> = Vec::from(
                            &decoded.i((batch_index, grid_row, grid_col, anchor_index, ..)),
                        );
                        if entries[4] > 0.5 {
                            results.push([
                                entries[0], entries[1], entries[2], entries[3], entries[5],
                            ]);
                        }
                    }
                }
            }
        }

        results
    }

    fn assert_boxes_recovered(decoded: &Tensor, boxes: &Tensor) {
        let (_batch_size, num_boxes, _num_entries) = boxes.size3().unwrap();
        let expect: Vec<f32> = Vec::from(&boxes.reshape(&[-1]));
        let mut expect: Vec<&[f32]> = expect.chunks(5).collect();

        let results = object_slots(decoded);
        assert_eq!(results.len(), num_boxes as usize);

        for result in &results {
            let position = expect.iter().position(|entries| {
                izip!(result.iter(), entries.iter())
                    .all(|(&lhs, &rhs)| (lhs - rhs).abs() < 1e-4)
            });
            let position = match position {
                Some(position) => position,
                None => panic!("no matching box for decoded {:?}", result),
            };
            expect.remove(position);
        }
        assert!(expect.is_empty());
    }

    #[test]
    fn encode_decode_round_trip() {
        let image_size = PixelSize::from_hw(256i64, 256i64).unwrap();
        let coder = build_coder(14, 14);
        let anchors = ratio_anchors(&image_size);
        let boxes = ratio_boxes(&PIXEL_BOXES, &image_size);

        let encoded = coder.encode(&boxes, &anchors);
        assert_eq!(encoded.size(), vec![1, 14, 14, 3, 6]);
        let decoded = coder.decode(&encoded, &anchors);
        assert_eq!(decoded.size(), vec![1, 14, 14, 3, 6]);

        assert_boxes_recovered(&decoded, &boxes);
    }

    #[test]
    fn encode_round_trip_non_square_grid() {
        let image_size = PixelSize::from_hw(224i64, 448i64).unwrap();
        let coder = build_coder(28, 56);
        let anchors = ratio_anchors(&image_size);
        let boxes = ratio_boxes(&PIXEL_BOXES, &image_size);

        let decoded = coder.decode(&coder.encode(&boxes, &anchors), &anchors);
        assert_boxes_recovered(&decoded, &boxes);
    }

    #[test]
    fn encode_keeps_empty_slots_finite() {
        let image_size = PixelSize::from_hw(256i64, 256i64).unwrap();
        let coder = build_coder(14, 14);
        let anchors = ratio_anchors(&image_size);
        let boxes = ratio_boxes(&PIXEL_BOXES, &image_size);

        let encoded = coder.encode(&boxes, &anchors);
        let all_finite: bool = encoded.isfinite().all().into();
        assert!(all_finite);

        // cell (6, 6) holds no box, so its log size ratios are exactly zero
        for anchor_index in 0..3 {
            let entries: Vec<f32> = Vec::from(&encoded.i((0, 6, 6, anchor_index, ..)));
            assert_eq!(entries[2], 0.0);
            assert_eq!(entries[3], 0.0);
            assert_eq!(entries[4], 0.0);
            assert_eq!(entries[5], 0.0);
        }
    }

    #[test]
    fn round_trip_recovers_distinct_boxes() {
        let mut rng = StdRng::seed_from_u64(42);
        let (grid_h, grid_w) = (8i64, 8i64);
        let num_boxes = 8;

        let mut cells: Vec<_> = (0..grid_h)
            .cartesian_product(0..grid_w)
            .collect();
        cells.shuffle(&mut rng);

        let entries: Vec<f32> = cells[0..num_boxes]
            .iter()
            .enumerate()
            .flat_map(|(class, &(grid_row, grid_col))| {
                let center_x =
                    (grid_col as f32 + rng.gen_range(0.25..0.75)) / grid_w as f32;
                let center_y =
                    (grid_row as f32 + rng.gen_range(0.25..0.75)) / grid_h as f32;
                let half_w = rng.gen_range(0.01..0.03);
                let half_h = rng.gen_range(0.01..0.03);
                vec![
                    center_x - half_w,
                    center_y - half_h,
                    center_x + half_w,
                    center_y + half_h,
                    class as f32,
                ]
            })
            .collect();
        let boxes = Tensor::of_slice(&entries).view([1, num_boxes as i64, 5]);
        let anchors = Tensor::of_slice(&[0.1f32, 0.1, 0.05, 0.05]).view([2, 2]);

        let coder = build_coder(grid_h, grid_w);
        let decoded = coder.decode(&coder.encode(&boxes, &anchors), &anchors);
        assert_boxes_recovered(&decoded, &boxes);
    }

    #[test]
    fn decode_shape_check() {
        let coder = build_coder(14, 14);
        assert_eq!(coder.grid_size().h, 14);
        let anchors = Tensor::of_slice(&[0.1f32, 0.1, 0.05, 0.05]).view([2, 2]);

        let wrong_grid = Tensor::zeros(&[1, 7, 7, 2, 6], (Kind::Float, Device::Cpu));
        assert!(coder.f_decode(&wrong_grid, &anchors).is_err());

        let wrong_anchors = Tensor::zeros(&[1, 14, 14, 3, 6], (Kind::Float, Device::Cpu));
        assert!(coder.f_decode(&wrong_anchors, &anchors).is_err());

        let wrong_entries = Tensor::zeros(&[1, 14, 14, 2, 5], (Kind::Float, Device::Cpu));
        assert!(coder.f_decode(&wrong_entries, &anchors).is_err());
    }
}
