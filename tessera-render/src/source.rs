//! Map data provider.

use tessera_core::{AltitudeArea, GeometryError, LevelGeometrySet, LevelInfo, Update};

/// Read access to the editable map data.
///
/// The rebuild never writes through this trait; it only reads one consistent
/// view of the map per generation.
pub trait MapSource {
    /// Every level, ascending by base altitude.
    fn levels(&self) -> Result<Vec<LevelInfo>, GeometryError>;

    /// Newest update whose changes are reflected in the map data.
    fn last_processed_update(&self) -> Update;

    /// Raw (uncropped) layers of one level.
    ///
    /// `altitude_areas_above` holds the altitude areas of intermediate levels
    /// above this one, sorted by altitude, so the source can derive ceiling
    /// heights from them.
    fn level_geometries(
        &self,
        level: &LevelInfo,
        altitude_areas_above: &[AltitudeArea],
    ) -> Result<LevelGeometrySet, GeometryError>;
}

impl<S: MapSource + ?Sized> MapSource for &S {
    fn levels(&self) -> Result<Vec<LevelInfo>, GeometryError> {
        (**self).levels()
    }

    fn last_processed_update(&self) -> Update {
        (**self).last_processed_update()
    }

    fn level_geometries(
        &self,
        level: &LevelInfo,
        altitude_areas_above: &[AltitudeArea],
    ) -> Result<LevelGeometrySet, GeometryError> {
        (**self).level_geometries(level, altitude_areas_above)
    }
}
