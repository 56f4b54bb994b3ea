//! Shared reshape evaluation for the `reshape` and `add_fields` stage
//! kinds (spec.md §4.5.2, §4.5.3), and for the filter+reshape fusion.

use rivulet_expr::{CompiledExpr, Compiler, ExprError};
use rivulet_repr::{Map, Record};
use rivulet_transform::{FieldSpec, ReshapeSpec};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReshapeMode {
    /// `reshape`: only named fields survive.
    Project,
    /// `add_fields`: every input field is preserved; named fields only add
    /// or overwrite.
    AddFields,
}

#[derive(Debug)]
enum CompiledFieldSpec {
    Include(String),
    Exclude(String),
    Computed(String, CompiledExpr),
}

#[derive(Debug)]
pub struct CompiledReshape {
    mode: ReshapeMode,
    fields: Vec<CompiledFieldSpec>,
}

impl CompiledReshape {
    pub fn compile(
        mode: ReshapeMode,
        spec: &ReshapeSpec,
        compiler: &Compiler,
    ) -> Result<CompiledReshape, ExprError> {
        let fields = spec
            .fields
            .iter()
            .map(|f| match f {
                FieldSpec::Include(name) => Ok(CompiledFieldSpec::Include(name.clone())),
                FieldSpec::Exclude(name) => Ok(CompiledFieldSpec::Exclude(name.clone())),
                FieldSpec::Computed(name, expr) => {
                    let compiled = compiler.compile_expr(expr.clone())?;
                    Ok(CompiledFieldSpec::Computed(name.clone(), compiled))
                }
            })
            .collect::<Result<Vec<_>, ExprError>>()?;
        Ok(CompiledReshape { mode, fields })
    }

    pub fn apply(&self, upstream: &Record) -> Record {
        match self.mode {
            ReshapeMode::Project => {
                let mut out = Map::new();
                for field in &self.fields {
                    match field {
                        CompiledFieldSpec::Include(name) => {
                            if let Some(value) = upstream.get_path(name) {
                                out.insert(name.clone(), value.clone());
                            }
                        }
                        CompiledFieldSpec::Exclude(_) => {}
                        CompiledFieldSpec::Computed(name, expr) => {
                            out.insert(name.clone(), expr.eval_record(upstream));
                        }
                    }
                }
                Record::new(out)
            }
            ReshapeMode::AddFields => {
                let mut out = upstream.fields().clone();
                for field in &self.fields {
                    match field {
                        CompiledFieldSpec::Include(_) => {}
                        CompiledFieldSpec::Exclude(name) => {
                            out.remove(name);
                        }
                        CompiledFieldSpec::Computed(name, expr) => {
                            out.insert(name.clone(), expr.eval_record(upstream));
                        }
                    }
                }
                Record::new(out)
            }
        }
    }
}
