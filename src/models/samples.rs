use super::{AxialTensionCutoff, DruckerPrager, SurfaceCollection, VonMises};
use crate::StrError;
use russell_tensor::{LinElasticity, Mandel, Tensor2, Tensor4};

/// Holds some sample elasticity tensors and model collections
pub struct Samples;

impl Samples {
    /// Returns the isotropic elasticity tensor (3D or plane-strain)
    pub fn elasticity(young: f64, poisson: f64, two_dim: bool) -> Tensor4 {
        let ela = LinElasticity::new(young, poisson, two_dim, false);
        ela.get_modulus().clone()
    }

    /// Returns the Mandel representation for 3D or plane-strain
    pub fn mandel(two_dim: bool) -> Mandel {
        if two_dim {
            Mandel::Symmetric2D
        } else {
            Mandel::Symmetric
        }
    }

    /// Returns a symmetric tensor with the given normal components
    pub fn diagonal(two_dim: bool, xx: f64, yy: f64, zz: f64) -> Tensor2 {
        let mut t = Tensor2::new(Samples::mandel(two_dim));
        let v = t.vector_mut();
        v[0] = xx;
        v[1] = yy;
        v[2] = zz;
        t
    }

    /// Returns a collection with a single von Mises surface (z0 = 9, H = 800)
    pub fn von_mises() -> Result<SurfaceCollection, StrError> {
        let mut surfaces = SurfaceCollection::new();
        surfaces.add(Box::new(VonMises::new(9.0, 800.0, 1e-10, 1e-10)?))?;
        Ok(surfaces)
    }

    /// Returns a collection with a single Drucker-Prager surface equivalent to [Samples::von_mises]
    pub fn drucker_prager_as_von_mises() -> Result<SurfaceCollection, StrError> {
        let mut surfaces = SurfaceCollection::new();
        surfaces.add(Box::new(DruckerPrager::new(0.0, 0.0, 0.0, 9.0, 800.0, 1e-10, 1e-10)?))?;
        Ok(surfaces)
    }

    /// Returns a collection with tension cutoffs on the xx and yy components (t0 = 1)
    pub fn biaxial_cutoff() -> Result<SurfaceCollection, StrError> {
        let mut surfaces = SurfaceCollection::new();
        surfaces.add(Box::new(AxialTensionCutoff::new(&[0, 1], 1.0, 0.0, 1e-10, 1e-10)?))?;
        Ok(surfaces)
    }

    /// Returns a collection with two identical tension cutoffs on the xx component (t0 = 1)
    pub fn duplicated_cutoff() -> Result<SurfaceCollection, StrError> {
        let mut surfaces = SurfaceCollection::new();
        surfaces.add(Box::new(AxialTensionCutoff::new(&[0, 0], 1.0, 0.0, 1e-10, 1e-10)?))?;
        Ok(surfaces)
    }

    /// Returns a collection mixing a von Mises surface and a tension cutoff on the xx component
    pub fn von_mises_with_cutoff() -> Result<SurfaceCollection, StrError> {
        let mut surfaces = SurfaceCollection::new();
        surfaces
            .add(Box::new(VonMises::new(9.0, 800.0, 1e-10, 1e-10)?))?
            .add(Box::new(AxialTensionCutoff::new(&[0], 4.0, 100.0, 1e-10, 1e-10)?))?;
        Ok(surfaces)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::Samples;
    use russell_lab::approx_eq;
    use russell_tensor::Mandel;

    #[test]
    fn samples_work() {
        let dde = Samples::elasticity(1500.0, 0.25, true);
        assert_eq!(dde.matrix().dims(), (4, 4));
        approx_eq(dde.matrix().get(3, 3), 1200.0, 1e-12);
        assert_eq!(Samples::mandel(false), Mandel::Symmetric);
        let t = Samples::diagonal(true, 1.0, 2.0, 3.0);
        assert_eq!(t.vector().as_data(), &[1.0, 2.0, 3.0, 0.0]);
        assert_eq!(Samples::von_mises().unwrap().n_surfaces(), 1);
        assert_eq!(Samples::biaxial_cutoff().unwrap().n_surfaces(), 2);
        assert_eq!(Samples::duplicated_cutoff().unwrap().n_surfaces(), 2);
        assert_eq!(Samples::von_mises_with_cutoff().unwrap().n_models(), 2);
    }
}
