#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};

use ms_core::{
    Axis, Cardinality, ConfigError, Element, MatrixSpaceError, RangeError, Ring, RingElements,
    ShapeError, StateError, UnsupportedError, checked_dimension,
};
use ms_dispatch::{Representation, RepresentationDecision, select_representation};
use ms_enumerate::{EnumerationPhase, WeightedTuples};
use ms_layout::{
    CoordinateMap, EntryOrder, dict_to_list, entry_count, list_to_dict, position, to_row_major,
    transpose_coordinates,
};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

/// Draws per entry before a forced-nonzero randomization settles for one.
const NONZERO_ATTEMPTS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpaceKey {
    ring: Ring,
    rows: usize,
    cols: usize,
    sparse: bool,
}

impl SpaceKey {
    #[must_use]
    pub fn ring(&self) -> &Ring {
        &self.ring
    }

    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    #[must_use]
    pub const fn sparse(&self) -> bool {
        self.sparse
    }
}

type Registry = HashMap<SpaceKey, Weak<SpaceInner>>;

fn registry() -> &'static Mutex<Registry> {
    static REGISTRY: OnceLock<Mutex<Registry>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Returns the canonical space for `(ring, rows, cols, sparse)`.
///
/// While any handle to a space is alive, every lookup with the same key
/// returns that same object. Lookup and insertion happen under one lock.
pub fn get_or_create(
    ring: Ring,
    rows: i128,
    cols: i128,
    sparse: bool,
) -> Result<MatrixSpace, MatrixSpaceError> {
    ring.validate()?;
    let rows = checked_dimension(Axis::Rows, rows)?;
    let cols = checked_dimension(Axis::Cols, cols)?;
    Ok(intern(SpaceKey {
        ring,
        rows,
        cols,
        sparse,
    }))
}

/// Whether a live space is registered under the given key.
#[must_use]
pub fn is_cached(ring: &Ring, rows: usize, cols: usize, sparse: bool) -> bool {
    let key = SpaceKey {
        ring: ring.clone(),
        rows,
        cols,
        sparse,
    };
    lock(registry())
        .get(&key)
        .is_some_and(|entry| entry.strong_count() > 0)
}

fn intern(key: SpaceKey) -> MatrixSpace {
    let mut table = lock(registry());
    if let Some(inner) = table.get(&key).and_then(Weak::upgrade) {
        debug!(
            ring = %key.ring,
            rows = key.rows,
            cols = key.cols,
            sparse = key.sparse,
            representation = %inner.decision.representation,
            "reusing matrix space"
        );
        return MatrixSpace(inner);
    }

    let before = table.len();
    table.retain(|_, entry| entry.strong_count() > 0);
    let pruned = before - table.len();
    if pruned > 0 {
        trace!(pruned, live = table.len(), "pruned expired matrix spaces");
    }

    let decision = select_representation(&key.ring, key.sparse);
    debug!(
        ring = %key.ring,
        rows = key.rows,
        cols = key.cols,
        sparse = key.sparse,
        representation = %decision.representation,
        fallback = decision.fallback_used,
        "created matrix space"
    );
    let inner = Arc::new(SpaceInner::new(key.clone(), decision));
    table.insert(key, Arc::downgrade(&inner));
    MatrixSpace(inner)
}

struct SpaceInner {
    key: SpaceKey,
    decision: RepresentationDecision,
    zero: OnceLock<Arc<Storage>>,
    identity: OnceLock<Arc<Storage>>,
    row_space: OnceLock<FreeModule>,
    column_space: OnceLock<FreeModule>,
    change_ring: Mutex<HashMap<Ring, Weak<SpaceInner>>>,
}

impl SpaceInner {
    fn new(key: SpaceKey, decision: RepresentationDecision) -> Self {
        Self {
            key,
            decision,
            zero: OnceLock::new(),
            identity: OnceLock::new(),
            row_space: OnceLock::new(),
            column_space: OnceLock::new(),
            change_ring: Mutex::new(HashMap::new()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Storage {
    Dense(Vec<Element>),
    Sparse(CoordinateMap<Element>),
}

/// Options for [`MatrixSpace::make_matrix`] and the typed constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixOptions {
    pub coerce: bool,
    pub copy: bool,
    /// `None` lets vector input infer its orientation; flat input then
    /// reads row-major.
    pub row_major: Option<bool>,
}

impl Default for MatrixOptions {
    fn default() -> Self {
        Self {
            coerce: true,
            copy: true,
            row_major: None,
        }
    }
}

impl MatrixOptions {
    #[must_use]
    pub const fn with_row_major(mut self, row_major: bool) -> Self {
        self.row_major = Some(row_major);
        self
    }

    #[must_use]
    pub const fn with_coerce(mut self, coerce: bool) -> Self {
        self.coerce = coerce;
        self
    }

    #[must_use]
    pub const fn with_copy(mut self, copy: bool) -> Self {
        self.copy = copy;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomOptions {
    /// Fraction of entries to randomize; `None` randomizes all of them.
    pub density: Option<f64>,
    /// Defaults to `true` exactly when `density` is set.
    pub nonzero: Option<bool>,
    pub bound: u64,
    pub seed: Option<u64>,
}

impl Default for RandomOptions {
    fn default() -> Self {
        Self {
            density: None,
            nonzero: None,
            bound: 2,
            seed: None,
        }
    }
}

/// Accepted input shapes for [`MatrixSpace::make_matrix`].
#[derive(Debug, Clone)]
pub enum Entries {
    Zero,
    Scalar(Element),
    Flat(Vec<Element>),
    Nested(Vec<Vec<Element>>),
    Vectors(Vec<Vector>),
    Sparse(CoordinateMap<Element>),
    Matrix(Matrix),
}

impl From<Element> for Entries {
    fn from(value: Element) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vec<Element>> for Entries {
    fn from(value: Vec<Element>) -> Self {
        Self::Flat(value)
    }
}

impl From<Vec<Vec<Element>>> for Entries {
    fn from(value: Vec<Vec<Element>>) -> Self {
        Self::Nested(value)
    }
}

impl From<Vec<Vector>> for Entries {
    fn from(value: Vec<Vector>) -> Self {
        Self::Vectors(value)
    }
}

impl From<CoordinateMap<Element>> for Entries {
    fn from(value: CoordinateMap<Element>) -> Self {
        Self::Sparse(value)
    }
}

impl From<Matrix> for Entries {
    fn from(value: Matrix) -> Self {
        Self::Matrix(value)
    }
}

/// An external element that can present itself as a matrix.
pub trait MatrixView {
    fn matrix_view(&self) -> Matrix;
}

impl MatrixView for Matrix {
    fn matrix_view(&self) -> Matrix {
        self.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Vector {
    entries: Vec<Element>,
}

impl Vector {
    #[must_use]
    pub fn new(entries: Vec<Element>) -> Self {
        Self { entries }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn entries(&self) -> &[Element] {
        &self.entries
    }

    #[must_use]
    pub fn into_entries(self) -> Vec<Element> {
        self.entries
    }
}

impl From<Vec<Element>> for Vector {
    fn from(entries: Vec<Element>) -> Self {
        Self::new(entries)
    }
}

impl FromIterator<Element> for Vector {
    fn from_iter<T: IntoIterator<Item = Element>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// The ambient module a space's rows or columns live in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FreeModule {
    ring: Ring,
    rank: usize,
    sparse: bool,
}

impl FreeModule {
    #[must_use]
    pub fn ring(&self) -> &Ring {
        &self.ring
    }

    #[must_use]
    pub const fn rank(&self) -> usize {
        self.rank
    }

    #[must_use]
    pub const fn is_sparse(&self) -> bool {
        self.sparse
    }

    #[must_use]
    pub fn zero_vector(&self) -> Vector {
        Vector::new(vec![self.ring.zero(); self.rank])
    }
}

impl fmt::Display for FreeModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sparse = if self.sparse { "Sparse " } else { "" };
        if self.ring.is_field() {
            write!(
                f,
                "{sparse}Vector space of dimension {} over {}",
                self.rank, self.ring
            )
        } else {
            write!(
                f,
                "{sparse}Ambient free module of rank {} over {}",
                self.rank, self.ring
            )
        }
    }
}

/// Canonical parent of all `rows x cols` matrices over one ring.
///
/// Handles are cheap to clone; two handles obtained for the same key are the
/// same object (see [`MatrixSpace::is_identical`]). Equality and ordering
/// look only at `(ring, rows, cols)`.
#[derive(Clone)]
pub struct MatrixSpace(Arc<SpaceInner>);

impl MatrixSpace {
    pub fn new(ring: Ring, rows: i128, cols: i128, sparse: bool) -> Result<Self, MatrixSpaceError> {
        get_or_create(ring, rows, cols, sparse)
    }

    /// Reconstructs a space from its persisted tuple.
    pub fn from_parts(
        ring: Ring,
        rows: usize,
        cols: usize,
        sparse: bool,
    ) -> Result<Self, MatrixSpaceError> {
        get_or_create(ring, rows as i128, cols as i128, sparse)
    }

    #[must_use]
    pub fn to_parts(&self) -> (Ring, usize, usize, bool) {
        let key = &self.0.key;
        (key.ring.clone(), key.rows, key.cols, key.sparse)
    }

    #[must_use]
    pub fn key(&self) -> &SpaceKey {
        &self.0.key
    }

    #[must_use]
    pub fn is_identical(&self, other: &MatrixSpace) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    #[must_use]
    pub fn ring(&self) -> &Ring {
        &self.0.key.ring
    }

    #[must_use]
    pub fn nrows(&self) -> usize {
        self.0.key.rows
    }

    #[must_use]
    pub fn ncols(&self) -> usize {
        self.0.key.cols
    }

    #[must_use]
    pub fn dimensions(&self) -> (usize, usize) {
        (self.nrows(), self.ncols())
    }

    /// Alias of [`MatrixSpace::dimensions`].
    #[must_use]
    pub fn dims(&self) -> (usize, usize) {
        self.dimensions()
    }

    /// Number of entries, `rows * cols`.
    #[must_use]
    pub fn dimension(&self) -> u128 {
        self.nrows() as u128 * self.ncols() as u128
    }

    #[must_use]
    pub fn size(&self) -> u128 {
        self.dimension()
    }

    #[must_use]
    pub fn ngens(&self) -> u128 {
        self.dimension()
    }

    #[must_use]
    pub fn is_sparse(&self) -> bool {
        self.0.key.sparse
    }

    #[must_use]
    pub fn is_dense(&self) -> bool {
        !self.is_sparse()
    }

    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.ring().is_finite()
    }

    #[must_use]
    pub fn is_square(&self) -> bool {
        self.nrows() == self.ncols()
    }

    #[must_use]
    pub fn representation(&self) -> Representation {
        self.0.decision.representation
    }

    #[must_use]
    pub fn decision(&self) -> RepresentationDecision {
        self.0.decision
    }

    /// Same shape and sparsity over `ring`, memoized per target ring.
    pub fn change_ring(&self, ring: Ring) -> Result<MatrixSpace, MatrixSpaceError> {
        if &ring == self.ring() {
            return Ok(self.clone());
        }
        ring.validate()?;
        let mut memo = lock(&self.0.change_ring);
        if let Some(inner) = memo.get(&ring).and_then(Weak::upgrade) {
            return Ok(MatrixSpace(inner));
        }
        let space = intern(SpaceKey {
            ring: ring.clone(),
            rows: self.nrows(),
            cols: self.ncols(),
            sparse: self.is_sparse(),
        });
        memo.retain(|_, entry| entry.strong_count() > 0);
        memo.insert(ring, Arc::downgrade(&space.0));
        Ok(space)
    }

    /// [`MatrixSpace::change_ring`] restricted to rings this ring embeds in.
    pub fn base_extend(&self, ring: Ring) -> Result<MatrixSpace, MatrixSpaceError> {
        if !ring.has_coerce_map_from(self.ring()) {
            return Err(UnsupportedError::NoBaseExtension {
                from: self.ring().to_string(),
                to: ring.to_string(),
            }
            .into());
        }
        self.change_ring(ring)
    }

    /// Space over the same ring with another shape.
    pub fn matrix_space(
        &self,
        rows: i128,
        cols: i128,
        sparse: bool,
    ) -> Result<MatrixSpace, MatrixSpaceError> {
        get_or_create(self.ring().clone(), rows, cols, sparse)
    }

    #[must_use]
    pub fn row_space(&self) -> FreeModule {
        self.0
            .row_space
            .get_or_init(|| FreeModule {
                ring: self.ring().clone(),
                rank: self.ncols(),
                sparse: self.is_sparse(),
            })
            .clone()
    }

    #[must_use]
    pub fn column_space(&self) -> FreeModule {
        self.0
            .column_space
            .get_or_init(|| FreeModule {
                ring: self.ring().clone(),
                rank: self.nrows(),
                sparse: self.is_sparse(),
            })
            .clone()
    }

    /// The frozen zero matrix, shared by every caller.
    pub fn zero_matrix(&self) -> Result<Matrix, MatrixSpaceError> {
        let storage = match self.0.zero.get() {
            Some(storage) => Arc::clone(storage),
            None => {
                let built = self.zero_storage()?;
                Arc::clone(self.0.zero.get_or_init(|| Arc::new(built)))
            }
        };
        Ok(self.wrap(storage, true))
    }

    /// The frozen identity matrix; square spaces only.
    pub fn identity_matrix(&self) -> Result<Matrix, MatrixSpaceError> {
        self.require_square()?;
        let storage = match self.0.identity.get() {
            Some(storage) => Arc::clone(storage),
            None => {
                let built = self.diagonal_storage(&self.ring().one())?;
                Arc::clone(self.0.identity.get_or_init(|| Arc::new(built)))
            }
        };
        Ok(self.wrap(storage, true))
    }

    /// The elementary matrices in row-major position order, each frozen.
    pub fn basis(&self) -> Result<Vec<Matrix>, MatrixSpaceError> {
        let count = entry_count(self.nrows(), self.ncols())?;
        (0..count).map(|idx| self.generator(idx)).collect()
    }

    /// The `index`-th elementary matrix.
    pub fn generator(&self, index: usize) -> Result<Matrix, MatrixSpaceError> {
        let count = self.dimension();
        if index as u128 >= count {
            return Err(ShapeError::GeneratorOutOfRange {
                index: index as u128,
                count,
            }
            .into());
        }
        let mut matrix = self.fresh_zero()?;
        let cols = self.ncols();
        matrix.store(index / cols, index % cols, self.ring().one());
        matrix.set_immutable();
        Ok(matrix)
    }

    /// Number of matrices in the space, `|ring|^(rows * cols)`.
    pub fn len(&self) -> Result<usize, MatrixSpaceError> {
        let Cardinality::Finite(order) = self.ring().order() else {
            return Err(UnsupportedError::InfiniteLength {
                ring: self.ring().to_string(),
            }
            .into());
        };
        let exponent = self.dimension();
        if exponent == 0 || order == 1 {
            return Ok(1);
        }
        let overflow = RangeError::CountOverflow { order, exponent };
        let exponent = u32::try_from(exponent).map_err(|_| overflow)?;
        usize::try_from(order)
            .ok()
            .and_then(|order| order.checked_pow(exponent))
            .ok_or_else(|| overflow.into())
    }

    /// Every matrix of the space in ascending weight, each exactly once.
    pub fn iter(&self) -> Result<MatrixIter, MatrixSpaceError> {
        if !self.ring().is_enumerable() {
            debug!(ring = %self.ring(), "matrix space iteration refused");
            return Err(UnsupportedError::IterationUnsupported {
                ring: self.ring().to_string(),
            }
            .into());
        }
        let elements = self.ring().elements()?;
        let slots = entry_count(self.nrows(), self.ncols())?;
        let tuples = if self.ring().is_finite() {
            WeightedTuples::finite(elements, slots)
        } else {
            WeightedTuples::unbounded(elements, slots)
        };
        Ok(MatrixIter {
            space: self.clone(),
            tuples,
        })
    }

    /// A random matrix built from a fresh zero matrix.
    pub fn random_element(&self, options: RandomOptions) -> Result<Matrix, MatrixSpaceError> {
        let density = options.density.unwrap_or(1.0);
        let nonzero = options.nonzero.unwrap_or(options.density.is_some());
        let mut rng = options
            .seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        let mut matrix = self.fresh_zero()?;
        matrix.randomize(density, nonzero, options.bound, &mut rng)?;
        Ok(matrix)
    }

    /// Normalizing entry point: inspects the shape of `entries` and hands
    /// it to the matching typed constructor.
    pub fn make_matrix(
        &self,
        entries: Entries,
        options: MatrixOptions,
    ) -> Result<Matrix, MatrixSpaceError> {
        match entries {
            Entries::Zero => self.fresh_zero(),
            Entries::Scalar(value) => self.from_scalar(&value),
            Entries::Flat(values) if values.is_empty() => self.fresh_zero(),
            Entries::Flat(values) => self.from_flat(values, options),
            Entries::Nested(rows) if rows.iter().all(Vec::is_empty) => self.fresh_zero(),
            Entries::Nested(rows) => self.from_nested(rows, options),
            Entries::Vectors(vectors) if vectors.is_empty() => self.fresh_zero(),
            Entries::Vectors(vectors) => {
                let as_rows = match options.row_major {
                    Some(flag) => flag,
                    None => self.infer_orientation(&vectors)?,
                };
                if as_rows {
                    self.from_rows(vectors, options)
                } else {
                    self.from_columns(vectors, options)
                }
            }
            Entries::Sparse(map) => self.from_sparse_map(map, options),
            Entries::Matrix(matrix) => self.adopt_matrix(matrix, options),
        }
    }

    /// Canonical coercion of a matrix from a space of the same shape whose
    /// ring embeds into this one.
    pub fn coerce_matrix(&self, matrix: &Matrix) -> Result<Matrix, MatrixSpaceError> {
        let source = matrix.parent();
        if source.is_identical(self) {
            return Ok(matrix.clone());
        }
        if source.dimensions() != self.dimensions()
            || !self.ring().has_coerce_map_from(source.ring())
        {
            return Err(UnsupportedError::NoCoercion {
                from: source.to_string(),
                to: self.to_string(),
            }
            .into());
        }
        self.make_matrix(Entries::Matrix(matrix.clone()), MatrixOptions::default())
    }

    /// Builds from the matrix an external element presents.
    pub fn make_matrix_from_view<V>(&self, element: &V) -> Result<Matrix, MatrixSpaceError>
    where
        V: MatrixView + ?Sized,
    {
        self.make_matrix(
            Entries::Matrix(element.matrix_view()),
            MatrixOptions::default().with_copy(false),
        )
    }

    /// Flat positional input; `row_major` defaults to `true`.
    pub fn from_flat(
        &self,
        entries: Vec<Element>,
        options: MatrixOptions,
    ) -> Result<Matrix, MatrixSpaceError> {
        let (rows, cols) = self.dimensions();
        let order = EntryOrder::from_row_major(options.row_major.unwrap_or(true));
        if self.is_sparse() {
            let values = if rows == 0 || cols == 0 {
                Vec::new()
            } else {
                self.coerce_all(entries)?
            };
            let map = list_to_dict(values, rows, cols, order, &self.ring().zero())?;
            return Ok(self.wrap(Arc::new(Storage::Sparse(map)), false));
        }
        let values = if options.coerce {
            self.coerce_all(entries)?
        } else {
            entries
        };
        let values = to_row_major(values, rows, cols, order)?;
        Ok(self.wrap(Arc::new(Storage::Dense(values)), false))
    }

    pub fn from_rows(
        &self,
        rows: Vec<Vector>,
        options: MatrixOptions,
    ) -> Result<Matrix, MatrixSpaceError> {
        self.from_vectors(rows, true, options)
    }

    pub fn from_columns(
        &self,
        columns: Vec<Vector>,
        options: MatrixOptions,
    ) -> Result<Matrix, MatrixSpaceError> {
        self.from_vectors(columns, false, options)
    }

    /// Nested rows are concatenated and always read row-major.
    pub fn from_nested(
        &self,
        rows: Vec<Vec<Element>>,
        options: MatrixOptions,
    ) -> Result<Matrix, MatrixSpaceError> {
        let flat = rows.into_iter().flatten().collect();
        self.from_flat(flat, options.with_row_major(true))
    }

    /// Coordinate-keyed input. Coordinates always address `(row, col)`.
    pub fn from_sparse_map(
        &self,
        entries: CoordinateMap<Element>,
        options: MatrixOptions,
    ) -> Result<Matrix, MatrixSpaceError> {
        let (rows, cols) = self.dimensions();
        if let Some(&(row, col)) = entries
            .keys()
            .find(|&&(row, col)| row >= rows || col >= cols)
        {
            return Err(ShapeError::CoordinateOutOfRange {
                row,
                col,
                rows,
                cols,
            }
            .into());
        }
        let zero = self.ring().zero();
        if self.is_sparse() {
            let mut map = CoordinateMap::new();
            for (coordinate, value) in entries {
                let value = if options.coerce {
                    self.ring().coerce(&value)?
                } else {
                    value
                };
                if value != zero {
                    map.insert(coordinate, value);
                }
            }
            return Ok(self.wrap(Arc::new(Storage::Sparse(map)), false));
        }
        let coerced = entries
            .into_iter()
            .map(|(coordinate, value)| Ok((coordinate, self.ring().coerce(&value)?)))
            .collect::<Result<Vec<_>, MatrixSpaceError>>()?;
        let values = dict_to_list(coerced, rows, cols, &zero)?;
        Ok(self.wrap(Arc::new(Storage::Dense(values)), false))
    }

    fn from_scalar(&self, value: &Element) -> Result<Matrix, MatrixSpaceError> {
        let value = self.ring().coerce(value)?;
        if value == self.ring().zero() {
            return self.fresh_zero();
        }
        self.require_square()?;
        if value == self.ring().one() {
            return Ok(self.identity_matrix()?.copy());
        }
        let storage = self.diagonal_storage(&value)?;
        Ok(self.wrap(Arc::new(storage), false))
    }

    fn from_vectors(
        &self,
        vectors: Vec<Vector>,
        as_rows: bool,
        options: MatrixOptions,
    ) -> Result<Matrix, MatrixSpaceError> {
        let (rows, cols) = self.dimensions();
        let (count, length) = if as_rows { (rows, cols) } else { (cols, rows) };
        if vectors.len() != count {
            return Err(ShapeError::VectorCount {
                expected: count,
                actual: vectors.len(),
            }
            .into());
        }
        if let Some(vector) = vectors.iter().find(|vector| vector.len() != length) {
            return Err(ShapeError::VectorLength {
                rows,
                cols,
                actual: vector.len(),
            }
            .into());
        }

        if self.is_dense() {
            let flat = vectors.into_iter().flat_map(Vector::into_entries).collect();
            return self.from_flat(flat, options.with_row_major(as_rows));
        }

        let zero = self.ring().zero();
        let mut map = CoordinateMap::new();
        for (outer, vector) in vectors.into_iter().enumerate() {
            for (inner, value) in vector.into_entries().into_iter().enumerate() {
                let value = self.ring().coerce(&value)?;
                if value != zero {
                    map.insert((outer, inner), value);
                }
            }
        }
        if !as_rows {
            map = transpose_coordinates(map);
        }
        Ok(self.wrap(Arc::new(Storage::Sparse(map)), false))
    }

    fn infer_orientation(&self, vectors: &[Vector]) -> Result<bool, MatrixSpaceError> {
        let (rows, cols) = self.dimensions();
        if rows == cols {
            return Ok(true);
        }
        if vectors.iter().all(|vector| vector.len() == cols) {
            return Ok(true);
        }
        if vectors.iter().all(|vector| vector.len() == rows) {
            return Ok(false);
        }
        let actual = vectors
            .iter()
            .map(Vector::len)
            .find(|&len| len != rows && len != cols)
            .unwrap_or(0);
        Err(ShapeError::VectorLength { rows, cols, actual }.into())
    }

    fn adopt_matrix(
        &self,
        matrix: Matrix,
        options: MatrixOptions,
    ) -> Result<Matrix, MatrixSpaceError> {
        if matrix.parent().is_identical(self) {
            if matrix.is_immutable() || !options.copy {
                return Ok(matrix);
            }
            return Ok(matrix.copy());
        }
        let values = matrix.list()?;
        self.from_flat(
            values,
            MatrixOptions {
                coerce: true,
                row_major: Some(true),
                ..options
            },
        )
    }

    fn from_canonical_row_major(&self, values: Vec<Element>) -> Matrix {
        let storage = if self.is_dense() {
            Storage::Dense(values)
        } else {
            let (rows, cols) = self.dimensions();
            let map = values
                .into_iter()
                .enumerate()
                .filter(|(_, value)| !value.is_zero())
                .map(|(idx, value)| (position(idx, rows, cols, EntryOrder::RowMajor), value))
                .collect();
            Storage::Sparse(map)
        };
        self.wrap(Arc::new(storage), false)
    }

    fn fresh_zero(&self) -> Result<Matrix, MatrixSpaceError> {
        Ok(self.zero_matrix()?.copy())
    }

    fn zero_storage(&self) -> Result<Storage, MatrixSpaceError> {
        if self.is_sparse() {
            return Ok(Storage::Sparse(CoordinateMap::new()));
        }
        let len = entry_count(self.nrows(), self.ncols())?;
        Ok(Storage::Dense(vec![self.ring().zero(); len]))
    }

    fn diagonal_storage(&self, value: &Element) -> Result<Storage, MatrixSpaceError> {
        let n = self.nrows();
        let mut storage = self.zero_storage()?;
        match &mut storage {
            Storage::Dense(values) => {
                for idx in 0..n {
                    values[idx * n + idx] = value.clone();
                }
            }
            Storage::Sparse(map) if !value.is_zero() => {
                for idx in 0..n {
                    map.insert((idx, idx), value.clone());
                }
            }
            Storage::Sparse(_) => {}
        }
        Ok(storage)
    }

    fn coerce_all(&self, entries: Vec<Element>) -> Result<Vec<Element>, MatrixSpaceError> {
        entries
            .iter()
            .map(|value| self.ring().coerce(value))
            .collect()
    }

    fn require_square(&self) -> Result<(), MatrixSpaceError> {
        if self.is_square() {
            Ok(())
        } else {
            Err(ShapeError::NotSquare {
                rows: self.nrows(),
                cols: self.ncols(),
            }
            .into())
        }
    }

    fn wrap(&self, storage: Arc<Storage>, immutable: bool) -> Matrix {
        Matrix {
            parent: self.clone(),
            storage,
            immutable,
        }
    }
}

impl fmt::Debug for MatrixSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatrixSpace")
            .field("ring", self.ring())
            .field("rows", &self.nrows())
            .field("cols", &self.ncols())
            .field("sparse", &self.is_sparse())
            .field("representation", &self.representation())
            .finish()
    }
}

impl fmt::Display for MatrixSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_sparse() { "sparse" } else { "dense" };
        write!(
            f,
            "Full MatrixSpace of {} by {} {kind} matrices over {}",
            self.nrows(),
            self.ncols(),
            self.ring()
        )
    }
}

impl PartialEq for MatrixSpace {
    fn eq(&self, other: &Self) -> bool {
        self.ring() == other.ring()
            && self.nrows() == other.nrows()
            && self.ncols() == other.ncols()
    }
}

impl Eq for MatrixSpace {}

impl Hash for MatrixSpace {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ring().hash(state);
        self.nrows().hash(state);
        self.ncols().hash(state);
    }
}

impl PartialOrd for MatrixSpace {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MatrixSpace {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ring()
            .cmp(other.ring())
            .then_with(|| self.nrows().cmp(&other.nrows()))
            .then_with(|| self.ncols().cmp(&other.ncols()))
    }
}

/// Lazy enumeration of a space, see [`MatrixSpace::iter`].
pub struct MatrixIter {
    space: MatrixSpace,
    tuples: WeightedTuples<RingElements>,
}

impl MatrixIter {
    #[must_use]
    pub fn phase(&self) -> EnumerationPhase {
        self.tuples.phase()
    }
}

impl Iterator for MatrixIter {
    type Item = Matrix;

    fn next(&mut self) -> Option<Self::Item> {
        let values = self.tuples.next()?;
        Some(self.space.from_canonical_row_major(values))
    }
}

/// A matrix owned by a [`MatrixSpace`].
///
/// Storage is shared copy-on-write: [`Matrix::copy`] is cheap and the first
/// write detaches it. Frozen matrices reject every write.
#[derive(Debug, Clone)]
pub struct Matrix {
    parent: MatrixSpace,
    storage: Arc<Storage>,
    immutable: bool,
}

impl Matrix {
    #[must_use]
    pub fn parent(&self) -> &MatrixSpace {
        &self.parent
    }

    #[must_use]
    pub fn nrows(&self) -> usize {
        self.parent.nrows()
    }

    #[must_use]
    pub fn ncols(&self) -> usize {
        self.parent.ncols()
    }

    #[must_use]
    pub fn is_immutable(&self) -> bool {
        self.immutable
    }

    pub fn set_immutable(&mut self) {
        self.immutable = true;
    }

    /// A mutable duplicate; storage is shared until either side writes.
    #[must_use]
    pub fn copy(&self) -> Matrix {
        Matrix {
            parent: self.parent.clone(),
            storage: Arc::clone(&self.storage),
            immutable: false,
        }
    }

    #[must_use]
    pub fn shares_storage(&self, other: &Matrix) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    pub fn get(&self, row: usize, col: usize) -> Result<Element, MatrixSpaceError> {
        self.check_bounds(row, col)?;
        Ok(match self.storage.as_ref() {
            Storage::Dense(values) => values[row * self.ncols() + col].clone(),
            Storage::Sparse(map) => map
                .get(&(row, col))
                .cloned()
                .unwrap_or_else(|| self.parent.ring().zero()),
        })
    }

    pub fn set(&mut self, row: usize, col: usize, value: Element) -> Result<(), MatrixSpaceError> {
        if self.immutable {
            return Err(StateError::Immutable.into());
        }
        self.check_bounds(row, col)?;
        let value = self.parent.ring().coerce(&value)?;
        self.store(row, col, value);
        Ok(())
    }

    /// Entries in row-major order.
    pub fn list(&self) -> Result<Vec<Element>, MatrixSpaceError> {
        match self.storage.as_ref() {
            Storage::Dense(values) => Ok(values.clone()),
            Storage::Sparse(map) => Ok(dict_to_list(
                map.iter().map(|(&at, value)| (at, value.clone())),
                self.nrows(),
                self.ncols(),
                &self.parent.ring().zero(),
            )?),
        }
    }

    pub fn rows(&self) -> Result<Vec<Vector>, MatrixSpaceError> {
        let values = self.list()?;
        let cols = self.ncols();
        Ok((0..self.nrows())
            .map(|row| Vector::new(values[row * cols..(row + 1) * cols].to_vec()))
            .collect())
    }

    pub fn columns(&self) -> Result<Vec<Vector>, MatrixSpaceError> {
        let values = self.list()?;
        let cols = self.ncols();
        Ok((0..cols)
            .map(|col| {
                (0..self.nrows())
                    .map(|row| values[row * cols + col].clone())
                    .collect::<Vector>()
            })
            .collect())
    }

    /// Coordinates of nonzero entries, row-major.
    #[must_use]
    pub fn nonzero_positions(&self) -> Vec<(usize, usize)> {
        match self.storage.as_ref() {
            Storage::Dense(values) => values
                .iter()
                .enumerate()
                .filter(|(_, value)| !value.is_zero())
                .map(|(idx, _)| position(idx, self.nrows(), self.ncols(), EntryOrder::RowMajor))
                .collect(),
            Storage::Sparse(map) => map
                .iter()
                .filter(|(_, value)| !value.is_zero())
                .map(|(&coordinate, _)| coordinate)
                .collect(),
        }
    }

    /// Overwrites `round(density * rows * cols)` distinct positions with
    /// random ring elements, nonzero ones when `nonzero` is set.
    pub fn randomize<R>(
        &mut self,
        density: f64,
        nonzero: bool,
        bound: u64,
        rng: &mut R,
    ) -> Result<(), MatrixSpaceError>
    where
        R: Rng + ?Sized,
    {
        if self.immutable {
            return Err(StateError::Immutable.into());
        }
        if !(0.0..=1.0).contains(&density) {
            return Err(ConfigError::InvalidDensity { density }.into());
        }
        let ring = self.parent.ring().clone();
        if nonzero && ring.one().is_zero() {
            return Err(UnsupportedError::NoNonzeroElements {
                ring: ring.to_string(),
            }
            .into());
        }
        let (rows, cols) = self.parent.dimensions();
        let total = entry_count(rows, cols)?;
        let amount = ((density * total as f64).round() as usize).min(total);
        let positions = if amount == total {
            (0..total).collect()
        } else {
            index::sample(&mut *rng, total, amount).into_vec()
        };
        for idx in positions {
            let value = draw(&ring, &mut *rng, bound, nonzero);
            let (row, col) = position(idx, rows, cols, EntryOrder::RowMajor);
            self.store(row, col, value);
        }
        Ok(())
    }

    /// Determinant of a `0x0` or `1x1` matrix.
    pub fn determinant(&self) -> Result<Element, MatrixSpaceError> {
        match self.trivial_square()? {
            0 => Ok(self.parent.ring().one()),
            1 => self.get(0, 0),
            n => Err(self.arithmetic("determinant", n)),
        }
    }

    /// Never true for `n x 0` or `0 x n` with `n > 0`.
    pub fn is_invertible(&self) -> Result<bool, MatrixSpaceError> {
        if !self.parent.is_square() {
            return Ok(false);
        }
        match self.nrows() {
            0 => Ok(true),
            1 => Ok(self.parent.ring().unit_inverse(&self.get(0, 0)?).is_some()),
            n => Err(self.arithmetic("invertibility", n)),
        }
    }

    pub fn inverse(&self) -> Result<Matrix, MatrixSpaceError> {
        match self.trivial_square()? {
            0 => Ok(self.copy()),
            1 => {
                let entry = self.get(0, 0)?;
                let inverse = self
                    .parent
                    .ring()
                    .unit_inverse(&entry)
                    .ok_or(UnsupportedError::NotInvertible { rows: 1, cols: 1 })?;
                let mut out = self.parent.fresh_zero()?;
                out.store(0, 0, inverse);
                Ok(out)
            }
            n => Err(self.arithmetic("inverse", n)),
        }
    }

    fn trivial_square(&self) -> Result<usize, MatrixSpaceError> {
        self.parent.require_square()?;
        Ok(self.nrows())
    }

    fn arithmetic(&self, operation: &'static str, n: usize) -> MatrixSpaceError {
        UnsupportedError::Arithmetic {
            operation,
            rows: n,
            cols: n,
        }
        .into()
    }

    fn check_bounds(&self, row: usize, col: usize) -> Result<(), MatrixSpaceError> {
        let (rows, cols) = self.parent.dimensions();
        if row >= rows || col >= cols {
            return Err(ShapeError::CoordinateOutOfRange {
                row,
                col,
                rows,
                cols,
            }
            .into());
        }
        Ok(())
    }

    fn store(&mut self, row: usize, col: usize, value: Element) {
        let cols = self.ncols();
        match Arc::make_mut(&mut self.storage) {
            Storage::Dense(values) => values[row * cols + col] = value,
            Storage::Sparse(map) => {
                if value.is_zero() {
                    map.remove(&(row, col));
                } else {
                    map.insert((row, col), value);
                }
            }
        }
    }

    fn nonzero_entries(&self) -> CoordinateMap<Element> {
        match self.storage.as_ref() {
            Storage::Dense(values) => values
                .iter()
                .enumerate()
                .filter(|(_, value)| !value.is_zero())
                .map(|(idx, value)| {
                    (
                        position(idx, self.nrows(), self.ncols(), EntryOrder::RowMajor),
                        value.clone(),
                    )
                })
                .collect(),
            Storage::Sparse(map) => map.clone(),
        }
    }
}

fn draw<R>(ring: &Ring, rng: &mut R, bound: u64, nonzero: bool) -> Element
where
    R: Rng + ?Sized,
{
    if !nonzero {
        return ring.random_element(rng, bound);
    }
    for _ in 0..NONZERO_ATTEMPTS {
        let value = ring.random_element(&mut *rng, bound);
        if !value.is_zero() {
            return value;
        }
    }
    ring.one()
}

impl PartialEq for Matrix {
    fn eq(&self, other: &Self) -> bool {
        if self.parent != other.parent {
            return false;
        }
        match (self.storage.as_ref(), other.storage.as_ref()) {
            (Storage::Dense(lhs), Storage::Dense(rhs)) => lhs == rhs,
            (Storage::Sparse(lhs), Storage::Sparse(rhs)) => lhs == rhs,
            _ => self.nonzero_entries() == other.nonzero_entries(),
        }
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (rows, cols) = self.parent.dimensions();
        if rows == 0 || cols == 0 {
            return write!(f, "[]");
        }
        let Ok(values) = self.list() else {
            return write!(f, "{rows} x {cols} matrix over {}", self.parent.ring());
        };
        let cells: Vec<String> = values.iter().map(ToString::to_string).collect();
        let width = cells.iter().map(String::len).max().unwrap_or(0);
        for row in 0..rows {
            if row > 0 {
                writeln!(f)?;
            }
            write!(f, "[")?;
            for col in 0..cols {
                if col > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{:>width$}", cells[row * cols + col])?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}
