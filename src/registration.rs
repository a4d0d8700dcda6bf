use crate::global_types::FrameId;
use crate::map::Map;

/// Unregisters every registered frame that ended up without a single
/// assigned keypoint. Returns the frames that were unregistered.
pub fn prune_unconstrained_frames(map: &mut Map) -> Vec<FrameId> {
    let unconstrained: Vec<FrameId> = map
        .registered_frames()
        .filter(|frame| frame.num_measurements() == 0)
        .map(|frame| frame.id)
        .collect();
    for frame_id in unconstrained.iter() {
        log::info!(
            "unregister frame {}: no track observes it ({} correspondences)",
            frame_id,
            map.correspondences().num_correspondences(*frame_id)
        );
        map.set_registered(*frame_id, false);
    }
    unconstrained
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::global_types::{Match, Observation};
    use crate::map::FramePair;
    use crate::test_scene::TestScene;

    #[test]
    fn test_prune_unconstrained_frames() {
        let scene = TestScene::line_of_frames(4, 2);
        let pairs = vec![FramePair::new(0, 1, vec![Match::new(0, 0)])];
        let mut map = scene.map_with(scene.frames(), pairs);
        map.create_track(scene.points[0], &[Observation::new(0, 0), Observation::new(1, 0)])
            .unwrap();

        let pruned = prune_unconstrained_frames(&mut map);
        assert_eq!(pruned, vec![2, 3]);
        assert!(map.is_registered(0) && map.is_registered(1));
        assert!(!map.is_registered(2) && !map.is_registered(3));
        for frame in map.registered_frames() {
            assert!(frame.num_measurements() > 0);
        }
        assert!(prune_unconstrained_frames(&mut map).is_empty());
    }
}
