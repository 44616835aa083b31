//! Real Las Vegas / Henderson places used as vendors, customers and driver
//! start points.
//!
//! Coordinates come from OpenStreetMap and are routable with the OSRM
//! Nevada extract.

/// A named place.
#[derive(Debug, Clone, Copy)]
pub struct Place {
    pub name: &'static str,
    pub lat: f64,
    pub lng: f64,
}

impl Place {
    pub const fn new(name: &'static str, lat: f64, lng: f64) -> Self {
        Self { name, lat, lng }
    }

    pub fn coords(&self) -> (f64, f64) {
        (self.lat, self.lng)
    }
}

/// Restaurants on the south end of the Strip, all within a few hundred meters.
pub const SOUTH_STRIP_VENDORS: &[Place] = &[
    Place::new("Hard Rock Cafe", 36.1041592, -115.1722166),
    Place::new("Outback Steakhouse Strip", 36.1037287, -115.1724577),
    Place::new("The Crack Shack", 36.1050709, -115.1735287),
    Place::new("Best Friend", 36.1049396, -115.1739173),
    Place::new("La La Noodle", 36.1041828, -115.1740723),
    Place::new("Il Fornaio", 36.1024474, -115.1740110),
];

/// Restaurants around the Venetian / Palazzo.
pub const MID_STRIP_VENDORS: &[Place] = &[
    Place::new("Otto Pizzeria", 36.1231219, -115.1684514),
    Place::new("Grand Lux Cafe", 36.1216416, -115.1685024),
    Place::new("Delmonico Steakhouse", 36.1231561, -115.1686955),
    Place::new("Grimaldi's Pizzeria", 36.1248850, -115.1683540),
];

/// Henderson restaurants, far from the Strip.
pub const HENDERSON_VENDORS: &[Place] = &[
    Place::new("Islander's Grill", 36.0335058, -114.9856162),
    Place::new("Naga", 36.0137634, -114.9928676),
    Place::new("Buffalo Wild Wings Henderson", 36.0090449, -114.9917034),
];

/// Customer addresses close to the south Strip vendors.
pub const SOUTH_STRIP_CUSTOMERS: &[Place] = &[
    Place::new("Coco's Bakery", 36.1004202, -115.1652380),
    Place::new("Gallagher's", 36.1025514, -115.1742518),
    Place::new("Emeril's New Orleans Fish House", 36.1028578, -115.1688386),
    Place::new("Wolfgang Puck Bar & Grill", 36.1022046, -115.1696020),
    Place::new("Earl of Sandwich Planet Hollywood", 36.1093912, -115.1720087),
    Place::new("PBR Grill", 36.1090017, -115.1724402),
];

/// Customer addresses in Henderson.
pub const HENDERSON_CUSTOMERS: &[Place] = &[
    Place::new("Green Valley Ranch Area", 36.0308, -115.0825),
    Place::new("Sunset Station Area", 36.0614, -115.0631),
    Place::new("Islander's Grill Patio", 36.0330, -114.9860),
];

/// Where drivers wait between deliveries.
pub const DRIVER_HUBS: &[Place] = &[
    Place::new("MGM Grand", 36.1023654, -115.1688720),
    Place::new("Bellagio", 36.1126, -115.1767),
    Place::new("Wynn Las Vegas", 36.1263781, -115.1658180),
    Place::new("Longhorn Casino", 36.1070664, -115.0591256),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinates_in_vegas_area() {
        let all = [
            SOUTH_STRIP_VENDORS,
            MID_STRIP_VENDORS,
            HENDERSON_VENDORS,
            SOUTH_STRIP_CUSTOMERS,
            HENDERSON_CUSTOMERS,
            DRIVER_HUBS,
        ];
        for place in all.iter().flat_map(|places| places.iter()) {
            assert!(place.lat > 35.9 && place.lat < 36.3, "{} lat out of range", place.name);
            assert!(place.lng > -115.4 && place.lng < -114.8, "{} lng out of range", place.name);
        }
    }
}
