use std::collections::BTreeSet;

use atlasprop_core::{
    resample, resample_labels, resample_mask, superpose, superpose_each, AffineTransform, DeformableTransform,
    DisplacementField, Interpolation, LabelVolume, Mask, SpaceId, TransformChain, Volume,
};
use burn::tensor::Tensor;
use burn_ndarray::NdArray;
use nalgebra::{Matrix4, Vector3};
use proptest::prelude::*;

type B = NdArray<f32>;

fn volume(values: Vec<f32>, shape: [usize; 3], space: &str) -> Volume<B> {
    let device = Default::default();
    Volume::from_values(values, shape, Matrix4::identity(), SpaceId::new(space), &device).unwrap()
}

#[test]
fn one_voxel_shift_moves_every_label() {
    // [z][y][x]
    let labels = LabelVolume::new(volume(vec![1.0, 2.0, 0.0, 1.0, 2.0, 0.0, 1.0, 2.0], [2, 2, 2], "atlas")).unwrap();
    let reference = volume(vec![0.0; 8], [2, 2, 2], "t2");
    let chain = TransformChain::new(AffineTransform::translation([1.0, 0.0, 0.0], SpaceId::new("atlas"), SpaceId::new("t2")));

    let out = resample_labels(&labels, &reference, &chain).unwrap();
    let values = out.volume().values().unwrap();
    assert_eq!(values, vec![2.0, 0.0, 1.0, 0.0, 0.0, 0.0, 2.0, 0.0]);
    assert!(!values.contains(&3.0));
    assert_eq!(out.space(), &SpaceId::new("t2"));
}

#[test]
fn lesion_voxel_keeps_its_label() {
    let mut mask_values = vec![0.0; 8];
    mask_values[7] = 1.0;
    let mask = Mask::binarize(&volume(mask_values, [2, 2, 2], "dti")).unwrap();
    let labels = LabelVolume::new(volume(vec![7.0; 8], [2, 2, 2], "dti")).unwrap();

    let overlap = superpose(&mask, &labels).unwrap();
    let values = overlap.volume().values().unwrap();
    assert_eq!(values[7], 7.0);
    assert!(values[..7].iter().all(|v| *v == 0.0));
}

#[test]
fn superposing_a_rebinarized_mask_is_idempotent() {
    let raw = volume(vec![0.0, 3.0, 0.5, -1.0, 9.0, 0.0, 1.0, 0.0], [2, 2, 2], "dti");
    let labels = LabelVolume::new(volume((1..=8).map(|v| v as f32).collect(), [2, 2, 2], "dti")).unwrap();

    let once = Mask::binarize(&raw).unwrap();
    let twice = Mask::binarize(once.volume()).unwrap();
    let a = superpose(&once, &labels).unwrap().volume().values().unwrap();
    let b = superpose(&twice, &labels).unwrap().volume().values().unwrap();
    assert_eq!(a, b);
}

#[test]
fn one_mask_against_two_granularities() {
    let mask = Mask::binarize(&volume(vec![1.0, 0.0, 1.0, 0.0], [1, 2, 2], "dti")).unwrap();
    let split = LabelVolume::new(volume(vec![11.0, 12.0, 13.0, 14.0], [1, 2, 2], "dti")).unwrap();
    let rsfmri = LabelVolume::new(volume(vec![2.0, 2.0, 3.0, 3.0], [1, 2, 2], "dti")).unwrap();

    let out = superpose_each(&mask, &[&split, &rsfmri]).unwrap();
    assert_eq!(out[0].volume().values().unwrap(), vec![11.0, 0.0, 13.0, 0.0]);
    assert_eq!(out[1].volume().values().unwrap(), vec![2.0, 0.0, 3.0, 0.0]);
}

#[test]
fn mask_resampling_stays_binary() {
    let mask = Mask::binarize(&volume(vec![0.0, 1.0, 1.0, 0.0], [1, 1, 4], "t2")).unwrap();
    let reference = volume(vec![0.0; 8], [1, 1, 8], "dti");
    let mut m = Matrix4::identity();
    m[(0, 0)] = 0.5;
    let chain = TransformChain::new(AffineTransform::new(m, SpaceId::new("t2"), SpaceId::new("dti")).unwrap());

    let out = resample_mask(&mask, &reference, &chain).unwrap();
    let values = out.volume().values().unwrap();
    assert!(values.iter().all(|v| *v == 0.0 || *v == 1.0));
    assert!(out.voxel_count() > 0);
}

#[test]
fn deformable_residual_matches_equivalent_affine() {
    let device = Default::default();
    let input = volume((0..27).map(|v| v as f32).collect(), [3, 3, 3], "atlas");
    let reference = volume(vec![0.0; 27], [3, 3, 3], "t2");

    let anchor = AffineTransform::new(Matrix4::identity(), SpaceId::atlas(), SpaceId::new("t2")).unwrap();
    let residual = Tensor::<B, 2>::from_floats([[1.0, 0.0, 0.0]], &device).repeat(&[27, 1]);
    let field = DisplacementField::from_vectors(residual, [3, 3, 3], Matrix4::identity()).unwrap();
    let deformable = TransformChain::new(DeformableTransform::new(anchor, field));

    let affine = TransformChain::new(AffineTransform::translation([1.0, 0.0, 0.0], SpaceId::atlas(), SpaceId::new("t2")));

    let via_field = resample(&input, &reference, &deformable, Interpolation::Nearest).unwrap();
    let via_affine = resample(&input, &reference, &affine, Interpolation::Nearest).unwrap();
    assert_eq!(via_field.values().unwrap(), via_affine.values().unwrap());
}

#[test]
fn two_hop_chain_resamples_in_one_pass() {
    let input = volume((0..64).map(|v| (v % 5) as f32).collect(), [4, 4, 4], "atlas");
    let labels = LabelVolume::new(input).unwrap();
    let t2 = volume(vec![0.0; 64], [4, 4, 4], "t2");
    let dti = volume(vec![0.0; 64], [4, 4, 4], "dti");

    let first = AffineTransform::translation([0.4, 0.0, 0.0], SpaceId::atlas(), SpaceId::new("t2"));
    let second = AffineTransform::translation([0.4, 0.0, 0.0], SpaceId::new("t2"), SpaceId::new("dti"));

    // one pass: the two sub-voxel shifts add up to one voxel
    let chain = TransformChain::new(first.clone()).then(second.clone()).unwrap();
    let direct = resample_labels(&labels, &dti, &chain).unwrap();

    // two passes round each sub-voxel shift away
    let hop = resample_labels(&labels, &t2, &TransformChain::new(first)).unwrap();
    let two_hops = resample_labels(&hop, &dti, &TransformChain::new(second)).unwrap();

    assert_ne!(direct.volume().values().unwrap(), two_hops.volume().values().unwrap());
    assert_eq!(direct.volume().values().unwrap()[0], 1.0);
}

fn label_grid() -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(0u32..6, 27).prop_map(|mut v| {
        v[0] = 0;
        v.into_iter().map(|x| (x * 1000) as f32).collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn nearest_resampling_never_invents_labels(
        values in label_grid(),
        scale in prop::array::uniform3(0.6f64..1.6),
        shift in prop::array::uniform3(-1.5f64..1.5),
    ) {
        let labels = LabelVolume::new(volume(values, [3, 3, 3], "atlas")).unwrap();
        let reference = volume(vec![0.0; 64], [4, 4, 4], "t2");
        let mut m = Matrix4::new_nonuniform_scaling(&Vector3::from(scale));
        m[(0, 3)] = shift[0];
        m[(1, 3)] = shift[1];
        m[(2, 3)] = shift[2];
        let chain = TransformChain::new(AffineTransform::new(m, SpaceId::atlas(), SpaceId::new("t2")).unwrap());

        let before: BTreeSet<u32> = labels.labels().unwrap();
        let after: BTreeSet<u32> = resample_labels(&labels, &reference, &chain).unwrap().labels().unwrap();
        prop_assert!(after.is_subset(&before));
    }
}
