use super::YieldSurfaceModel;
use crate::StrError;
use russell_lab::Vector;
use russell_tensor::{Mandel, Tensor2, Tensor4};
use std::ops::Range;

/// Holds a read-only collection of yield-surface models
///
/// The surfaces of all models are numbered globally in the order the models are added.
pub struct SurfaceCollection {
    /// All models
    models: Vec<Box<dyn YieldSurfaceModel>>,

    /// Maps global surface index to model index
    model_of: Vec<usize>,

    /// Index of the first surface of each model
    first: Vec<usize>,
}

/// Holds the values and derivatives of all surfaces at one state
pub struct SurfaceData {
    /// Yield functions
    pub f: Vec<f64>,

    /// Derivatives of the yield functions w.r.t stress
    pub df: Vec<Tensor2>,

    /// Derivatives of the yield functions w.r.t the internal parameter
    pub dfq: Vec<f64>,

    /// Flow directions
    pub r: Vec<Tensor2>,

    /// Derivatives of the flow directions w.r.t stress
    pub dr: Vec<Tensor4>,

    /// Derivatives of the flow directions w.r.t the internal parameter
    pub drq: Vec<Tensor2>,

    /// Hardening potentials
    pub h: Vec<f64>,

    /// Derivatives of the hardening potentials w.r.t stress
    pub dh: Vec<Tensor2>,

    /// Derivatives of the hardening potentials w.r.t the internal parameter
    pub dhq: Vec<f64>,
}

impl SurfaceData {
    /// Allocates a new instance
    pub fn new(mandel: Mandel, n_surfaces: usize) -> Self {
        SurfaceData {
            f: vec![0.0; n_surfaces],
            df: vec![Tensor2::new(mandel); n_surfaces],
            dfq: vec![0.0; n_surfaces],
            r: vec![Tensor2::new(mandel); n_surfaces],
            dr: vec![Tensor4::new(mandel); n_surfaces],
            drq: vec![Tensor2::new(mandel); n_surfaces],
            h: vec![0.0; n_surfaces],
            dh: vec![Tensor2::new(mandel); n_surfaces],
            dhq: vec![0.0; n_surfaces],
        }
    }
}

impl SurfaceCollection {
    /// Allocates a new (empty) instance
    pub fn new() -> Self {
        SurfaceCollection {
            models: Vec::new(),
            model_of: Vec::new(),
            first: Vec::new(),
        }
    }

    /// Adds a model to the collection
    pub fn add(&mut self, model: Box<dyn YieldSurfaceModel>) -> Result<&mut Self, StrError> {
        let n = model.n_surfaces();
        if n < 1 {
            return Err("yield-surface model must have at least one surface");
        }
        for s in 0..n {
            if !(model.f_tol(s) > 0.0) {
                return Err("yield function tolerance must be > 0.0");
            }
        }
        if !(model.ic_tol() > 0.0) {
            return Err("internal constraint tolerance must be > 0.0");
        }
        let index = self.models.len();
        self.first.push(self.model_of.len());
        self.model_of.extend(std::iter::repeat(index).take(n));
        self.models.push(model);
        Ok(self)
    }

    /// Returns the number of models
    pub fn n_models(&self) -> usize {
        self.models.len()
    }

    /// Returns the total number of surfaces
    pub fn n_surfaces(&self) -> usize {
        self.model_of.len()
    }

    /// Returns the model owning a surface
    pub fn model_of(&self, surface: usize) -> usize {
        self.model_of[surface]
    }

    /// Returns the range of global surface indices of a model
    pub fn surfaces_of(&self, model: usize) -> Range<usize> {
        let start = self.first[model];
        start..(start + self.models[model].n_surfaces())
    }

    /// Returns access to a model
    pub fn model(&self, model: usize) -> &dyn YieldSurfaceModel {
        self.models[model].as_ref()
    }

    /// Returns the yield function tolerance of a surface
    pub fn f_tol(&self, surface: usize) -> f64 {
        let m = self.model_of[surface];
        self.models[m].f_tol(surface - self.first[m])
    }

    /// Returns the internal constraint tolerance of a model
    pub fn ic_tol(&self, model: usize) -> f64 {
        self.models[model].ic_tol()
    }

    /// Returns whether a model has any surface flagged in `flags`
    pub fn any_in_model(&self, model: usize, flags: &[bool]) -> bool {
        self.surfaces_of(model).any(|s| flags[s])
    }

    /// Calculates the yield functions of all surfaces
    pub fn yield_functions(&self, f: &mut [f64], stress: &Tensor2, intnl: &Vector) -> Result<(), StrError> {
        for (m, model) in self.models.iter().enumerate() {
            let range = self.surfaces_of(m);
            model.yield_function(&mut f[range], stress, intnl[m])?;
        }
        Ok(())
    }

    /// Calculates the yield function derivatives w.r.t stress of all surfaces
    pub fn df_dstress(&self, df: &mut [Tensor2], stress: &Tensor2, intnl: &Vector) -> Result<(), StrError> {
        for (m, model) in self.models.iter().enumerate() {
            let range = self.surfaces_of(m);
            model.df_dstress(&mut df[range], stress, intnl[m])?;
        }
        Ok(())
    }

    /// Calculates the yield functions, flow directions, and hardening potentials of all surfaces
    pub fn residual_terms(&self, data: &mut SurfaceData, stress: &Tensor2, intnl: &Vector) -> Result<(), StrError> {
        for (m, model) in self.models.iter().enumerate() {
            let range = self.surfaces_of(m);
            let q = intnl[m];
            model.yield_function(&mut data.f[range.clone()], stress, q)?;
            model.flow_potential(&mut data.r[range.clone()], stress, q)?;
            model.hard_potential(&mut data.h[range], stress, q)?;
        }
        Ok(())
    }

    /// Calculates all values and derivatives of all surfaces
    pub fn all_terms(&self, data: &mut SurfaceData, stress: &Tensor2, intnl: &Vector) -> Result<(), StrError> {
        self.residual_terms(data, stress, intnl)?;
        for (m, model) in self.models.iter().enumerate() {
            let range = self.surfaces_of(m);
            let q = intnl[m];
            model.df_dstress(&mut data.df[range.clone()], stress, q)?;
            model.df_dintnl(&mut data.dfq[range.clone()], stress, q)?;
            model.dflow_dstress(&mut data.dr[range.clone()], stress, q)?;
            model.dflow_dintnl(&mut data.drq[range.clone()], stress, q)?;
            model.dhard_dstress(&mut data.dh[range.clone()], stress, q)?;
            model.dhard_dintnl(&mut data.dhq[range], stress, q)?;
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
