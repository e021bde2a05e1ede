use crate::{common::*, ratio::Ratio, size::RatioSize};

/// Computes the best matched anchor index for every box.
///
/// The matching score is the intersection-over-union of the box and anchor
/// shapes evaluated on widths and heights only, so the score ignores the
/// box position. Ties resolve to the smallest anchor index. Boxes and
/// anchors of zero area produce NaN scores that propagate to the output.
///
/// - boxes: `(batch_size, num_boxes, (x_min, y_min, x_max, y_max, ..))`
/// - anchors: `(num_anchors, (w, h))`
///
/// Returns anchor indexes in shape `(batch_size, num_boxes)`.
pub fn f_match_best_anchor(boxes: &Tensor, anchors: &Tensor) -> Result<Tensor> {
    let (_batch_size, _num_boxes, num_entries) = boxes.size3()?;
    ensure!(
        num_entries >= 4,
        "expect at least 4 entries per box, but get {}",
        num_entries
    );
    let (num_anchors, num_params) = anchors.size2()?;
    ensure!(num_anchors > 0, "the anchor set must not be empty");
    ensure!(
        num_params == 2,
        "expect anchors in shape (num_anchors, 2), but get (num_anchors, {})",
        num_params
    );

    let anchor_w = anchors.i((.., 0));
    let anchor_h = anchors.i((.., 1));
    let anchor_area = &anchor_w * &anchor_h;

    let box_w = (boxes.i((.., .., 2)) - boxes.i((.., .., 0))).unsqueeze(-1);
    let box_h = (boxes.i((.., .., 3)) - boxes.i((.., .., 1))).unsqueeze(-1);
    let box_area = &box_w * &box_h;

    let intersection = box_w.minimum(&anchor_w) * box_h.minimum(&anchor_h);
    let union = box_area + anchor_area - &intersection;
    let iou = intersection / union;

    Ok(iou.argmax(-1, false))
}

pub fn match_best_anchor(boxes: &Tensor, anchors: &Tensor) -> Tensor {
    f_match_best_anchor(boxes, anchors).unwrap()
}

/// Converts normalized anchor shapes to a `(num_anchors, (w, h))` tensor.
///
/// Every anchor width and height is checked to be a valid `[0, 1]` ratio.
pub fn f_anchors_to_tensor(anchors: &[RatioSize<R64>]) -> Result<Tensor> {
    ensure!(!anchors.is_empty(), "the anchor set must not be empty");
    let pairs: Vec<_> = anchors
        .iter()
        .map(|anchor_size| -> Result<_> {
            let anchor_w: f32 = Ratio::try_from(anchor_size.w)?.into();
            let anchor_h: f32 = Ratio::try_from(anchor_size.h)?.into();
            Ok((anchor_w, anchor_h))
        })
        .try_collect()?;
    let (anchor_w_vec, anchor_h_vec) = pairs.into_iter().unzip_n_vec();

    let anchors = Tensor::stack(
        &[
            Tensor::of_slice(&anchor_w_vec),
            Tensor::of_slice(&anchor_h_vec),
        ],
        1,
    )
    .set_requires_grad(false);
    Ok(anchors)
}

pub fn anchors_to_tensor(anchors: &[RatioSize<R64>]) -> Tensor {
    f_anchors_to_tensor(anchors).unwrap()
}
