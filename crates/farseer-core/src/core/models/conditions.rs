use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Position of one experiment in the `(z, y, x)` condition space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coordinate {
    pub z: String,
    pub y: String,
    pub x: String,
}

impl Coordinate {
    pub fn new(z: impl Into<String>, y: impl Into<String>, x: impl Into<String>) -> Self {
        Self {
            z: z.into(),
            y: y.into(),
            x: x.into(),
        }
    }

    pub fn group(&self) -> GroupKey {
        GroupKey {
            z: self.z.clone(),
            y: self.y.clone(),
        }
    }

    pub fn get(&self, axis: Axis) -> &str {
        match axis {
            Axis::Cond1 => &self.x,
            Axis::Cond2 => &self.y,
            Axis::Cond3 => &self.z,
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.z, self.y, self.x)
    }
}

/// A `(z, y)` pair: the experiments sharing one reference sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    pub z: String,
    pub y: String,
}

impl GroupKey {
    pub fn new(z: impl Into<String>, y: impl Into<String>) -> Self {
        Self {
            z: z.into(),
            y: y.into(),
        }
    }

    pub fn with_x(&self, x: &str) -> Coordinate {
        Coordinate::new(self.z.clone(), self.y.clone(), x)
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.z, self.y)
    }
}

/// Titration axes. `Cond1` is the primary titration variable (x).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Axis {
    Cond1,
    Cond2,
    Cond3,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::Cond1, Axis::Cond2, Axis::Cond3];

    pub fn as_str(&self) -> &'static str {
        match self {
            Axis::Cond1 => "cond1",
            Axis::Cond2 => "cond2",
            Axis::Cond3 => "cond3",
        }
    }

    /// The two axes held fixed when this axis is observed, outermost first.
    pub fn fixed_axes(&self) -> (Axis, Axis) {
        match self {
            Axis::Cond1 => (Axis::Cond3, Axis::Cond2),
            Axis::Cond2 => (Axis::Cond3, Axis::Cond1),
            Axis::Cond3 => (Axis::Cond2, Axis::Cond1),
        }
    }

    pub fn dimension_label(&self) -> &'static str {
        match self {
            Axis::Cond1 => "x",
            Axis::Cond2 => "y",
            Axis::Cond3 => "z",
        }
    }
}

#[derive(Debug, Error)]
#[error("Invalid axis string: '{0}'. Expected 'cond1', 'cond2' or 'cond3'.")]
pub struct ParseAxisError(String);

impl FromStr for Axis {
    type Err = ParseAxisError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cond1" | "x" => Ok(Axis::Cond1),
            "cond2" | "y" => Ok(Axis::Cond2),
            "cond3" | "z" => Ok(Axis::Cond3),
            _ => Err(ParseAxisError(s.to_string())),
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResonanceType {
    Backbone,
    Sidechains,
}

impl ResonanceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResonanceType::Backbone => "Backbone",
            ResonanceType::Sidechains => "Sidechains",
        }
    }
}

impl fmt::Display for ResonanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered labels along each condition axis.
///
/// Labels are kept sorted lexicographically; this order defines the step
/// order of every titration and the layout of the cube.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionKeys {
    z: Vec<String>,
    y: Vec<String>,
    x: Vec<String>,
}

impl ConditionKeys {
    pub fn new<I, S>(z: I, y: I, x: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            z: Self::normalize(z),
            y: Self::normalize(y),
            x: Self::normalize(x),
        }
    }

    fn normalize<I, S>(labels: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        labels.sort();
        labels.dedup();
        labels
    }

    pub fn z(&self) -> &[String] {
        &self.z
    }

    pub fn y(&self) -> &[String] {
        &self.y
    }

    pub fn x(&self) -> &[String] {
        &self.x
    }

    pub fn along(&self, axis: Axis) -> &[String] {
        match axis {
            Axis::Cond1 => &self.x,
            Axis::Cond2 => &self.y,
            Axis::Cond3 => &self.z,
        }
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        (self.z.len(), self.y.len(), self.x.len())
    }

    pub fn expected_count(&self) -> usize {
        self.z.len() * self.y.len() * self.x.len()
    }

    /// Label of the reference step along `cond1` (the first x label).
    pub fn reference_x(&self) -> Option<&str> {
        self.x.first().map(String::as_str)
    }

    /// Every `(z, y, x)` triple in lexicographic order.
    pub fn coordinates(&self) -> impl Iterator<Item = Coordinate> + '_ {
        self.z.iter().flat_map(move |z| {
            self.y.iter().flat_map(move |y| {
                self.x
                    .iter()
                    .map(move |x| Coordinate::new(z.clone(), y.clone(), x.clone()))
            })
        })
    }

    pub fn groups(&self) -> impl Iterator<Item = GroupKey> + '_ {
        self.z.iter().flat_map(move |z| {
            self.y
                .iter()
                .map(move |y| GroupKey::new(z.clone(), y.clone()))
        })
    }

    pub fn index_of(&self, axis: Axis, label: &str) -> Option<usize> {
        self.along(axis).iter().position(|l| l == label)
    }
}
