//! Health Connect code tables

/// Display name for a Health Connect exercise type code
pub fn exercise_name(exercise_type: i32) -> &'static str {
    match exercise_type {
        2 => "Badminton",
        4 => "Basketball",
        5 => "Biking",
        8 => "Boot Camp",
        10 => "Boxing",
        14 => "Calisthenics",
        16 => "Cricket",
        24 => "Elliptical",
        26 => "Fencing",
        29 => "Football (American)",
        31 => "Golf",
        32 => "Guided Breathing",
        33 => "Gymnastics",
        34 => "Handball",
        35 => "HIIT",
        36 => "Hiking",
        37 => "Ice Hockey",
        38 => "Ice Skating",
        43 => "Martial Arts",
        46 => "Pilates",
        48 => "Racquetball",
        49 => "Running",
        50 => "Running (Treadmill)",
        51 => "Rowing",
        52 => "Rugby",
        53 => "Walking",
        54 => "Sailing",
        56 => "Skating",
        57 => "Skiing",
        58 => "Snowboarding",
        59 => "Snowshoeing",
        60 => "Soccer",
        61 => "Softball",
        62 => "Squash",
        63 => "Stair Climbing",
        64 => "Stair Climbing (Machine)",
        65 => "Strength Training",
        67 => "Surfing",
        68 => "Swimming (Open Water)",
        69 => "Swimming (Pool)",
        70 => "Table Tennis",
        71 => "Tennis",
        73 => "Volleyball",
        75 => "Weightlifting",
        76 => "Wheelchair",
        78 => "Yoga",
        _ => "Other",
    }
}

/// Natural key for an exercise session from its 16-byte uuid blob
pub fn exercise_external_id(uuid: &[u8]) -> String {
    match uuid::Uuid::from_slice(uuid) {
        Ok(id) => format!("hc-{}", id.simple()),
        Err(_) => {
            let hex: String = uuid.iter().map(|b| format!("{:02x}", b)).collect();
            format!("hc-{}", hex)
        }
    }
}
