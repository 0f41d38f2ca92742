//! Conversions from stored rows to API models.

use chrono::Utc;
use serde::de::DeserializeOwned;

use crate::{
    entity::{
        cart_items::Model as CartItemModel, order_items::Model as OrderItemModel,
        orders::Model as OrderModel, payments::Model as PaymentModel,
        products::Model as ProductModel, reviews::Model as ReviewModel, users::Model as UserModel,
    },
    error::{AppError, AppResult},
    models::{
        CartItem, Inventory, Order, OrderItem, OrderStatus, Payment, PaymentMethod,
        PaymentStatus, Product, ProductCategory, Ratings, Review, Role, User,
    },
};

fn corrupt(column: &str, value: &str) -> AppError {
    AppError::Internal(anyhow::anyhow!("unexpected {column} value {value:?}"))
}

fn from_json<T: DeserializeOwned>(column: &str, value: serde_json::Value) -> AppResult<T> {
    serde_json::from_value(value)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid {column} json: {e}")))
}

pub fn user_from_entity(model: UserModel) -> AppResult<User> {
    Ok(User {
        role: Role::parse(&model.role).ok_or_else(|| corrupt("users.role", &model.role))?,
        addresses: from_json("users.addresses", model.addresses)?,
        id: model.id,
        name: model.name,
        email: model.email,
        phone: model.phone,
        is_active: model.is_active,
        created_at: model.created_at.with_timezone(&Utc),
    })
}

pub fn review_from_entity(model: ReviewModel) -> Review {
    Review {
        id: model.id,
        user_id: model.user_id,
        name: model.name,
        rating: model.rating,
        comment: model.comment,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

pub fn product_from_entity(model: ProductModel, reviews: Vec<Review>) -> AppResult<Product> {
    Ok(Product {
        category: ProductCategory::parse(&model.category)
            .ok_or_else(|| corrupt("products.category", &model.category))?,
        images: from_json("products.images", model.images)?,
        inventory: Inventory {
            quantity: model.inventory_quantity,
            track_quantity: model.track_quantity,
        },
        ratings: Ratings {
            average: model.ratings_average,
            count: model.ratings_count,
        },
        reviews,
        id: model.id,
        name: model.name,
        description: model.description,
        price: model.price,
        discounted_price: model.discounted_price,
        sku: model.sku,
        is_active: model.is_active,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

pub fn cart_item_from_entity(model: CartItemModel) -> CartItem {
    CartItem {
        id: model.id,
        product_id: model.product_id,
        name: model.name,
        price: model.price,
        image: model.image,
        quantity: model.quantity,
    }
}

pub fn order_item_from_entity(model: OrderItemModel) -> OrderItem {
    OrderItem {
        id: model.id,
        product_id: model.product_id,
        name: model.name,
        price: model.price,
        image: model.image,
        quantity: model.quantity,
    }
}

pub fn order_status(model: &OrderModel) -> AppResult<OrderStatus> {
    OrderStatus::parse(&model.status).ok_or_else(|| corrupt("orders.status", &model.status))
}

pub fn order_from_entity(model: OrderModel, items: Vec<OrderItemModel>) -> AppResult<Order> {
    Ok(Order {
        status: order_status(&model)?,
        payment_method: PaymentMethod::parse(&model.payment_method)
            .ok_or_else(|| corrupt("orders.payment_method", &model.payment_method))?,
        shipping_address: from_json("orders.shipping_address", model.shipping_address)?,
        payment_result: model
            .payment_result
            .map(|value| from_json("orders.payment_result", value))
            .transpose()?,
        items: items.into_iter().map(order_item_from_entity).collect(),
        id: model.id,
        user_id: model.user_id,
        items_price: model.items_price,
        tax_price: model.tax_price,
        shipping_price: model.shipping_price,
        total_price: model.total_price,
        is_paid: model.is_paid,
        paid_at: model.paid_at.map(|dt| dt.with_timezone(&Utc)),
        is_delivered: model.is_delivered,
        delivered_at: model.delivered_at.map(|dt| dt.with_timezone(&Utc)),
        tracking_number: model.tracking_number,
        notes: model.notes,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

pub fn payment_status(model: &PaymentModel) -> AppResult<PaymentStatus> {
    PaymentStatus::parse(&model.status).ok_or_else(|| corrupt("payments.status", &model.status))
}

pub fn payment_from_entity(model: PaymentModel) -> AppResult<Payment> {
    Ok(Payment {
        status: payment_status(&model)?,
        id: model.id,
        order_id: model.order_id,
        user_id: model.user_id,
        transaction_id: model.transaction_id,
        amount: model.amount,
        currency: model.currency,
        refund_amount: model.refund_amount,
        refund_reason: model.refund_reason,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}
