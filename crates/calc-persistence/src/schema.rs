// Esquema Diesel de calculos de masa.
// Tablas: calculations, reaction_calculations, reactions, users
use diesel::allow_tables_to_appear_in_same_query;
diesel::table! {
    calculations (id) {
        id -> Text,
        status -> Text,
        output_koef -> Nullable<Double>,
        date_create_ts -> BigInt,
        date_form_ts -> Nullable<BigInt>,
        date_finish_ts -> Nullable<BigInt>,
        creator_id -> Text,
        moderator_id -> Nullable<Text>,
    }
}
diesel::table! {
    reaction_calculations (id) {
        id -> Text,
        reaction_id -> BigInt,
        calculation_id -> Text,
        output_mass -> Double,
        input_mass -> Nullable<Double>,
    }
}
diesel::table! {
    reactions (id) {
        id -> BigInt,
        title -> Text,
        formula -> Text,
        conversion_factor -> Double,
        is_delete -> Bool,
    }
}
diesel::table! {
    users (id) {
        id -> Text,
        login -> Text,
        is_moderator -> Bool,
    }
}
allow_tables_to_appear_in_same_query!(calculations, reaction_calculations, reactions, users);
