use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use crate::brep::{BRepOperator, IntersectionStatus};
use crate::condition::Condition;
use crate::container::ElementContainer;
use crate::element::Element;
use crate::grid::GridIndexer;
use crate::mesh::TriangleMesh;
use crate::moment_fit::create_integration_points_trimmed;
use crate::quadrature::{assemble_multi_element_rules, assemble_single_element};
use crate::settings::{Settings, CLASSIFY_TOL_REL};
use crate::stl;
use crate::vtk;

/// End-to-end embedding run: classify all grid cells against the solid,
/// equip every active cell with a positive-weight cubature rule, and clip
/// the boundary-condition surfaces cell by cell.
pub struct Pipeline {
    settings: Settings,
    mesh: TriangleMesh,
    conditions: Vec<Condition>,
}

impl Pipeline {
    /// Load the input geometry and the boundary-condition surfaces.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let mesh = stl::read_stl(Path::new(&settings.input_filename))
            .with_context(|| format!("loading geometry '{}'", settings.input_filename))?;

        let mut conditions = Vec::with_capacity(settings.conditions.len());
        for condition_settings in &settings.conditions {
            conditions.push(Condition::from_settings(condition_settings)?);
        }

        Ok(Self {
            settings,
            mesh,
            conditions,
        })
    }

    /// Build a pipeline from an already constructed mesh. Used by tests.
    pub fn from_mesh(settings: Settings, mesh: TriangleMesh) -> Self {
        Self {
            settings,
            mesh,
            conditions: Vec::new(),
        }
    }

    pub fn mesh(&self) -> &TriangleMesh {
        &self.mesh
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Warn when the grid does not fully contain the input surface.
    fn check_bounds(&self, indexer: &GridIndexer) {
        if self.settings.echo_level == 0 {
            return;
        }
        let mesh_bbox = self.mesh.bounding_box();
        let grid = indexer.bounds_xyz();
        for d in 0..3 {
            if grid.lower[d] > mesh_bbox.lower[d] || grid.upper[d] < mesh_bbox.upper[d] {
                println!(
                    "Warning :: The grid box {:?} .. {:?} does not fully contain the \
                     bounding box of the input STL: {:?} .. {:?}",
                    grid.lower, grid.upper, mesh_bbox.lower, mesh_bbox.upper
                );
                break;
            }
        }
    }

    fn output_path(&self, file: &str) -> PathBuf {
        Path::new(&self.settings.output_directory_name).join(file)
    }

    /// Run the full pipeline and return the container of active cells.
    pub fn run(&mut self) -> Result<ElementContainer> {
        let echo = self.settings.echo_level;
        let start = Instant::now();
        if echo > 0 {
            println!("cutcell ------------------------------------------ START");
        }

        let mut volume_brep = 0.0;
        if self.settings.embedding_flag {
            volume_brep = self.mesh.volume();
            if echo > 0 {
                println!("Volume of B-Rep model: {volume_brep}");
                vtk::write_mesh_file(&self.mesh, &self.output_path("geometry.vtk"))?;
            }
        }

        let indexer = GridIndexer::from_settings(&self.settings);
        self.check_bounds(&indexer);

        // Conditions are taken out so the operator can borrow the mesh.
        let mut conditions = std::mem::take(&mut self.conditions);
        let brep = BRepOperator::new(&self.mesh);
        let container = self.compute(&brep, &indexer, &mut conditions)?;
        drop(brep);
        self.conditions = conditions;

        let num_trimmed = container.iter().filter(|e| e.is_trimmed()).count();
        if echo > 0 {
            vtk::write_elements_file(&container, &self.output_path("elements.vtk"))?;
            vtk::write_integration_points_file(
                &container,
                &self.output_path("integration_points.vtk"),
            )?;
            for (i, condition) in self.conditions.iter().enumerate() {
                let filename = format!("condition_{:?}_{}.stl", condition.kind(), i + 1);
                stl::write_stl_file(condition.conforming_mesh(), &self.output_path(&filename))?;
            }

            println!("Number of active elements: {}", container.len());
            println!("Number of trimmed elements: {num_trimmed}");

            if echo > 1 && self.settings.embedding_flag && volume_brep > 0.0 {
                let volume_ips = container.volume_of_all_ips();
                println!(
                    "The computed quadrature represents {:.4}% of the B-Rep volume.",
                    volume_ips / volume_brep * 100.0
                );
            }

            println!("Elapsed time: {:?}", start.elapsed());
            println!("cutcell ------------------------------------------- END");
        }

        Ok(container)
    }

    fn compute(
        &self,
        brep: &BRepOperator<'_>,
        indexer: &GridIndexer,
        conditions: &mut [Condition],
    ) -> Result<ElementContainer> {
        let echo = self.settings.echo_level;
        let total = indexer.num_total();
        let order = self.settings.polynomial_order;

        let cell_extents = indexer.bbox_xyz_from_index(0).extents();
        let classify_tol = CLASSIFY_TOL_REL * cell_extents.min();

        // Phase 1: classify every cell.
        let t_classify = Instant::now();
        let classifications: Option<Vec<IntersectionStatus>> = if self.settings.embedding_flag {
            Some(
                (0..total)
                    .into_par_iter()
                    .map(|index| brep.classify_cell(&indexer.bbox_xyz_from_index(index), classify_tol))
                    .collect(),
            )
        } else {
            None
        };
        let et_classify = t_classify.elapsed();

        // Phase 2: build and publish active elements. Workers own the cell
        // they are building; the container publish is the only shared write.
        let container = Mutex::new(ElementContainer::new(indexer.num_elements()));
        let timings = Mutex::new((0.0_f64, 0.0_f64)); // (intersection, fitting)

        let progress = if echo > 0 {
            ProgressBar::new(total as u64).with_style(
                ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len}")
                    .expect("static template")
                    .progress_chars("=> "),
            )
        } else {
            ProgressBar::hidden()
        };
        progress.set_message("cells");

        let ggq = self.settings.integration_method.is_ggq();

        (0..total).into_par_iter().try_for_each(|index| -> Result<()> {
            progress.inc(1);

            let status = match &classifications {
                Some(states) => states[index],
                None => IntersectionStatus::Inside,
            };
            if status == IntersectionStatus::Outside {
                return Ok(());
            }

            let bounds_xyz = indexer.bbox_xyz_from_index(index);
            let bounds_uvw = indexer.bbox_uvw_from_index(index);
            let mut element = Element::new(index + 1, bounds_xyz.clone(), bounds_uvw);

            let valid = match status {
                IntersectionStatus::Trimmed => {
                    element.set_trimmed(true);
                    let t_intersect = Instant::now();
                    let domain = brep.build_trimmed_domain(
                        &bounds_xyz,
                        self.settings.min_element_volume_ratio,
                        self.settings.min_num_boundary_triangles,
                        self.settings.neglect_elements_if_mesh_is_flawed,
                    )?;
                    let et_intersect = t_intersect.elapsed().as_secs_f64();

                    match domain {
                        Some(domain) => {
                            element.set_trimmed_domain(domain);
                            let t_fit = Instant::now();
                            let residual = create_integration_points_trimmed(
                                &mut element,
                                order,
                                self.settings.moment_fitting_residual,
                                self.settings.init_point_distribution_factor,
                                echo,
                            );
                            let et_fit = t_fit.elapsed().as_secs_f64();
                            {
                                let mut t = timings.lock().expect("timings lock");
                                t.0 += et_intersect;
                                t.1 += et_fit;
                            }
                            if residual > self.settings.moment_fitting_residual && echo > 1 {
                                println!(
                                    "Cell {}: moment-fitting residual {residual:.3e} above target",
                                    index + 1
                                );
                            }
                            !element.integration_points().is_empty()
                        }
                        None => {
                            if echo > 1 {
                                println!("Cell {}: trimmed domain rejected", index + 1);
                            }
                            false
                        }
                    }
                }
                IntersectionStatus::Inside => {
                    if !ggq {
                        assemble_single_element(&mut element, order);
                    }
                    true
                }
                IntersectionStatus::Outside => unreachable!(),
            };

            if valid {
                container.lock().expect("container lock").insert(element);
            }
            Ok(())
        })?;
        progress.finish_and_clear();

        let mut container = container.into_inner().expect("container lock poisoned");

        // Phase 3: clip boundary-condition surfaces against every cell.
        // Triangles on an interior cell interface go to the upper neighbor.
        let grid_n = indexer.num_elements();
        for condition in conditions.iter_mut() {
            let condition_brep = BRepOperator::new(condition.mesh());
            let mut pieces: Vec<(usize, TriangleMesh)> = (0..total)
                .into_par_iter()
                .filter_map(|index| {
                    let bbox = indexer.bbox_xyz_from_index(index);
                    let ijk = indexer.ijk_from_index(index);
                    let upper_exclusive =
                        [0, 1, 2].map(|d| ijk[d] + 1 < grid_n[d]);
                    let piece = condition_brep.clip_mesh_untagged(&bbox, upper_exclusive);
                    (piece.num_triangles() > 0).then_some((index, piece))
                })
                .collect();
            // Deterministic accumulation order regardless of scheduling.
            pieces.sort_by_key(|&(index, _)| index);
            for (_, piece) in &pieces {
                condition.add_to_conforming(piece);
            }
        }

        // Multi-cell reduced rules replace the per-cell tensor rules.
        if ggq {
            assemble_multi_element_rules(&mut container, order, self.settings.integration_method);
        }

        if echo > 1 {
            let threads = rayon::current_num_threads() as f64;
            let (et_intersect, et_fit) = *timings.lock().expect("timings lock");
            println!("Elapsed times of individual tasks --------------");
            println!("Detection of trimmed cells: ------ {:?}", et_classify);
            println!("Compute intersection: ------------ {:.3}s", et_intersect / threads);
            println!("Moment fitting: ------------------ {:.3}s", et_fit / threads);
        }

        Ok(container)
    }
}
