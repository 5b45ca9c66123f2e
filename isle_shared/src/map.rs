//! Tile map types.
//!
//! The server sends the whole map as an array of rows on every `gameState`.
//! The client stores it row-major in a flat vector and never diffs it; a new
//! map replaces the old one wholesale.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Terrain variant of a tile (`0` water, `1` sand, `2` grass on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TileKind {
    Water,
    Sand,
    Grass,
}

impl TryFrom<u8> for TileKind {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(TileKind::Water),
            1 => Ok(TileKind::Sand),
            2 => Ok(TileKind::Grass),
            other => Err(format!("unknown tile type {other}")),
        }
    }
}

impl From<TileKind> for u8 {
    fn from(kind: TileKind) -> u8 {
        match kind {
            TileKind::Water => 0,
            TileKind::Sand => 1,
            TileKind::Grass => 2,
        }
    }
}

/// Fog-of-war state of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Never seen. The server spells this `unexplored`.
    #[default]
    #[serde(rename = "unexplored", alias = "unseen")]
    Unseen,
    Visible,
    /// Seen before, currently out of sight.
    Explored,
}

/// One map cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    #[serde(rename = "type")]
    pub kind: TileKind,
    #[serde(default)]
    pub visibility: Visibility,
}

impl Tile {
    pub fn new(kind: TileKind) -> Self {
        Self {
            kind,
            visibility: Visibility::Unseen,
        }
    }
}

/// Row-major grid of tiles with fixed dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<Tile>>", into = "Vec<Vec<Tile>>")]
pub struct TileMap {
    width: usize,
    height: usize,
    tiles: Vec<Tile>,
}

/// Rows of a map did not all have the same length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaggedMapError {
    pub row: usize,
    pub expected: usize,
    pub found: usize,
}

impl fmt::Display for RaggedMapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "map row {} has {} tiles, expected {}",
            self.row, self.found, self.expected
        )
    }
}

impl std::error::Error for RaggedMapError {}

impl TileMap {
    /// Creates a map filled with one terrain kind, all tiles unseen.
    pub fn filled(width: usize, height: usize, kind: TileKind) -> Self {
        Self {
            width,
            height,
            tiles: vec![Tile::new(kind); width * height],
        }
    }

    /// Builds a map from rows; every row must have the same length.
    pub fn from_rows(rows: Vec<Vec<Tile>>) -> Result<Self, RaggedMapError> {
        let height = rows.len();
        let width = rows.first().map_or(0, Vec::len);
        let mut tiles = Vec::with_capacity(width * height);
        for (row, cells) in rows.into_iter().enumerate() {
            if cells.len() != width {
                return Err(RaggedMapError {
                    row,
                    expected: width,
                    found: cells.len(),
                });
            }
            tiles.extend(cells);
        }
        Ok(Self {
            width,
            height,
            tiles,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 {
            return None;
        }
        let (x, y) = (x as usize, y as usize);
        (x < self.width && y < self.height).then_some(y * self.width + x)
    }

    /// Returns the tile at `(x, y)`, or `None` outside the grid.
    pub fn get(&self, x: i32, y: i32) -> Option<&Tile> {
        self.index(x, y).map(|i| &self.tiles[i])
    }

    /// Iterates tiles with their coordinates, row by row.
    pub fn iter(&self) -> impl Iterator<Item = (i32, i32, &Tile)> {
        let width = self.width.max(1);
        self.tiles
            .iter()
            .enumerate()
            .map(move |(i, t)| ((i % width) as i32, (i / width) as i32, t))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (i32, i32, &mut Tile)> {
        let width = self.width.max(1);
        self.tiles
            .iter_mut()
            .enumerate()
            .map(move |(i, t)| ((i % width) as i32, (i / width) as i32, t))
    }

    /// Counts tiles in a given visibility state.
    pub fn count_visibility(&self, visibility: Visibility) -> usize {
        self.tiles
            .iter()
            .filter(|t| t.visibility == visibility)
            .count()
    }
}

impl TryFrom<Vec<Vec<Tile>>> for TileMap {
    type Error = RaggedMapError;

    fn try_from(rows: Vec<Vec<Tile>>) -> Result<Self, Self::Error> {
        TileMap::from_rows(rows)
    }
}

impl From<TileMap> for Vec<Vec<Tile>> {
    fn from(map: TileMap) -> Self {
        if map.width == 0 {
            return vec![Vec::new(); map.height];
        }
        map.tiles.chunks(map.width).map(<[Tile]>::to_vec).collect()
    }
}
